use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::Category;

#[derive(Debug, Parser)]
#[command(
    name = "cinetrack",
    version,
    about = "Manage a personal video catalog and resume where you left off"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// List catalog entries.
    List {
        #[arg(long, value_enum, default_value_t = ViewArg::Home)]
        view: ViewArg,
    },
    /// Entries with saved progress, most recent first.
    Continue,
    /// Details and episodes of one entry.
    Show { id: String },
    /// Play a movie or an episode.
    Play {
        id: String,
        #[arg(long)]
        episode: Option<String>,
    },
    /// Toggle an entry in the favorites list.
    Favorite { id: String },
    /// Create a new entry.
    Create(EditArgs),
    /// Edit an existing entry.
    Edit {
        id: String,
        #[command(flatten)]
        fields: EditArgs,
    },
    /// Append an episode; a movie becomes a soap-opera.
    AddEpisode(EpisodeArgs),
    /// Change fields of one episode, keeping its id.
    EditEpisode {
        id: String,
        episode_id: String,
        #[command(flatten)]
        fields: EpisodeFields,
    },
    /// Remove one episode from an entry.
    RemoveEpisode { id: String, episode_id: String },
    /// Upload an image and print its public URL.
    Upload { path: PathBuf },
    /// Show how a video URL would be played.
    Resolve { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ViewArg {
    Home,
    Favorites,
    Movie,
    SoapOpera,
    Series,
}

#[derive(Debug, Clone, Default, Args)]
pub(crate) struct EditArgs {
    #[arg(long)]
    pub(crate) title: Option<String>,
    #[arg(long)]
    pub(crate) description: Option<String>,
    #[arg(long)]
    pub(crate) poster: Option<String>,
    #[arg(long)]
    pub(crate) banner: Option<String>,
    #[arg(long, value_enum)]
    pub(crate) category: Option<Category>,
    #[arg(long)]
    pub(crate) relevance: Option<u32>,
    #[arg(long)]
    pub(crate) year: Option<i32>,
    #[arg(long)]
    pub(crate) age_rating: Option<String>,
    /// Comma-separated genre list.
    #[arg(long)]
    pub(crate) genres: Option<String>,
    #[arg(long)]
    pub(crate) video_url: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct EpisodeArgs {
    pub(crate) id: String,
    #[command(flatten)]
    pub(crate) fields: EpisodeFields,
}

#[derive(Debug, Clone, Default, Args)]
pub(crate) struct EpisodeFields {
    #[arg(long)]
    pub(crate) title: Option<String>,
    #[arg(long)]
    pub(crate) url: Option<String>,
    /// Length in seconds.
    #[arg(long)]
    pub(crate) duration: Option<u32>,
    #[arg(long)]
    pub(crate) description: Option<String>,
    #[arg(long)]
    pub(crate) thumbnail: Option<String>,
}
