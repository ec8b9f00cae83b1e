mod display;


use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info};

use crate::catalog::{
    Catalog, EditDraft, View, add_episode, current_year, new_content_id, remove_episode,
};
use crate::cli::{Cli, Command, EditArgs, EpisodeArgs, EpisodeFields, ViewArg};
use crate::config::{Config, ENV_REMOTE_KEY, ENV_REMOTE_URL};
use crate::db::LocalStore;
use crate::model::{Category, Content, Episode, OverridePatch, ProgressMap};
use crate::paths::database_file_path;
use crate::playback::{
    MpvSurface, OpenerSurface, PlaybackSession, PlaybackSurface, PlayingDescriptor, SessionEnd,
    with_interrupts_ignored,
};
use crate::resolver::{self, PlaybackMode};
use crate::store::{
    DeviceSession, PostgrestBackend, ProgressSink, RemoteBackend, StoreAdapter, Unconfigured,
};

use self::display::{
    GAUGE_WIDTH, favorite_marker, format_last_watched, format_position, progress_gauge, truncate,
};

/// Relevance given to entries created from the command line.
const NEW_CONTENT_RELEVANCE: u32 = 90;

pub(crate) fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    if let Some(Command::Resolve { url }) = &cli.command {
        run_resolve(url);
        return Ok(());
    }

    let store = open_store(&config)?;
    match cli.command {
        Some(Command::List { view }) => run_list(&store, view_for(view)),
        None => run_list(&store, View::Home),
        Some(Command::Continue) => run_continue(&store),
        Some(Command::Show { id }) => run_show(&store, &id),
        Some(Command::Play { id, episode }) => run_play(&store, &config, &id, episode.as_deref()),
        Some(Command::Favorite { id }) => run_favorite(&store, &id),
        Some(Command::Create(fields)) => run_create(&store, &fields),
        Some(Command::Edit { id, fields }) => run_edit(&store, &id, &fields),
        Some(Command::AddEpisode(args)) => run_add_episode(&store, &args),
        Some(Command::EditEpisode {
            id,
            episode_id,
            fields,
        }) => run_edit_episode(&store, &id, &episode_id, &fields),
        Some(Command::RemoveEpisode { id, episode_id }) => {
            run_remove_episode(&store, &id, &episode_id)
        }
        Some(Command::Upload { path }) => run_upload(&store, &config, &path),
        Some(Command::Resolve { .. }) => Ok(()),
    }
}

fn open_store(config: &Config) -> Result<StoreAdapter> {
    let db_path = database_file_path()?;
    let local = LocalStore::open(&db_path)?;
    local.migrate()?;
    let session = DeviceSession::load_or_create(&local)?;

    let remote: Box<dyn RemoteBackend> = match config.remote() {
        Some(remote) => Box::new(PostgrestBackend::new(
            &remote.url,
            &remote.api_key,
            config.connect_timeout(),
            config.read_timeout(),
        )),
        None => {
            debug!("no remote configured; using on-device storage");
            Box::new(Unconfigured)
        }
    };

    let store = StoreAdapter::new(remote, local, session);
    debug!(device_id = store.session().device_id(), "store ready");
    Ok(store)
}

fn load_catalog(store: &StoreAdapter) -> Catalog {
    let loaded = store.load_all();
    Catalog::from_parts(
        &loaded.overrides,
        loaded.favorites,
        loaded.progress,
        current_year(),
    )
}

fn find<'a>(catalog: &'a Catalog, id: &str) -> Result<&'a Content> {
    catalog
        .get(id)
        .with_context(|| format!("no content with id `{id}`"))
}

pub(crate) fn view_for(arg: ViewArg) -> View {
    match arg {
        ViewArg::Home => View::Home,
        ViewArg::Favorites => View::Favorites,
        ViewArg::Movie => View::Category(Category::Movie),
        ViewArg::SoapOpera => View::Category(Category::SoapOpera),
        ViewArg::Series => View::Category(Category::Series),
    }
}

fn run_list(store: &StoreAdapter, view: View) -> Result<()> {
    let catalog = load_catalog(store);
    let items = catalog.view(view);
    if items.is_empty() {
        match view {
            View::Favorites => println!("No favorites yet. Use `cinetrack favorite <id>`."),
            _ => println!("Nothing here yet. Run `cinetrack create --title <title>` first."),
        }
        return Ok(());
    }

    println!(
        "{:<22} {:<36} {:<11} {:<5} {:<1} {:<17}",
        "ID", "TITLE", "CATEGORY", "YEAR", "F", "PROGRESS"
    );
    for content in items {
        println!(
            "{:<22} {:<36} {:<11} {:<5} {:<1} {:<17}",
            truncate(&content.id, 22),
            truncate(&content.title, 36),
            content.category,
            content.year,
            favorite_marker(catalog.is_favorite(&content.id)),
            progress_gauge(catalog.card_progress(content), GAUGE_WIDTH)
        );
    }
    Ok(())
}

fn run_continue(store: &StoreAdapter) -> Result<()> {
    let catalog = load_catalog(store);
    let watched = catalog.continue_watching();
    if watched.is_empty() {
        println!("Nothing to continue. Play something with `cinetrack play <id>`.");
        return Ok(());
    }

    println!(
        "{:<22} {:<30} {:<24} {:<9} {:<16}",
        "ID", "TITLE", "EPISODE", "AT", "LAST WATCHED"
    );
    for content in watched {
        let Some(record) = catalog.progress().get(&content.id) else {
            continue;
        };
        let episode = record
            .episode_id
            .as_deref()
            .map(|episode_id| {
                content
                    .episode(episode_id)
                    .map_or(episode_id, |episode| episode.title.as_str())
            })
            .unwrap_or("-");
        println!(
            "{:<22} {:<30} {:<24} {:<9} {:<16}",
            truncate(&content.id, 22),
            truncate(&content.title, 30),
            truncate(episode, 24),
            format_position(record.position_secs),
            format_last_watched(record.last_updated_ms)
        );
    }
    Ok(())
}

fn run_show(store: &StoreAdapter, id: &str) -> Result<()> {
    let catalog = load_catalog(store);
    let content = find(&catalog, id)?;

    println!("{}{}", content.title, if catalog.is_favorite(id) { " (favorite)" } else { "" });
    println!("  Id:        {}", content.id);
    println!("  Category:  {}", content.category);
    println!("  Year:      {}", content.year);
    println!("  Rating:    {}", content.age_rating);
    println!("  Relevance: {}%", content.relevance);
    if !content.genres.is_empty() {
        let genres: Vec<&str> = content.genres.iter().map(String::as_str).collect();
        println!("  Genres:    {}", genres.join(", "));
    }
    println!("  Poster:    {}", content.poster_url);
    println!("  Banner:    {}", content.banner_url);
    if !content.description.is_empty() {
        println!("\n{}", content.description);
    }

    let progress = catalog.progress().get(id);
    if content.category.is_movie() {
        let source = resolver::resolve(content.video_url.as_deref());
        if source.is_playable() {
            println!("\n  Video ({}): {}", source.mode, source.playable_url);
        } else {
            println!("\n  No video URL set.");
        }
        if let Some(record) = progress {
            println!("  Resume at: {}", format_position(record.position_secs));
        }
        return Ok(());
    }

    if content.episodes.is_empty() {
        println!("\n  No episodes yet. Use `cinetrack add-episode {id}`.");
        return Ok(());
    }
    println!();
    for (index, episode) in content.episodes.iter().enumerate() {
        let resume = progress
            .filter(|record| record.episode_id.as_deref() == Some(episode.id.as_str()))
            .map(|record| format!(" (resume at {})", format_position(record.position_secs)))
            .unwrap_or_default();
        let duration = if episode.duration_secs > 0 {
            format_position(f64::from(episode.duration_secs))
        } else {
            "-".to_string()
        };
        println!(
            "  {:>3}. {:<24} {:<36} {:>8}{resume}",
            index + 1,
            truncate(&episode.id, 24),
            truncate(&episode.title, 36),
            duration
        );
    }
    Ok(())
}

/// Picks what `play` should start: the requested episode, the episode the
/// stored progress points at, or the first one. Movies play themselves.
pub(crate) fn select_episode<'a>(
    content: &'a Content,
    requested: Option<&str>,
    progress: &ProgressMap,
) -> Result<Option<&'a Episode>> {
    if let Some(episode_id) = requested {
        return content
            .episode(episode_id)
            .map(Some)
            .with_context(|| format!("`{}` has no episode `{episode_id}`", content.id));
    }
    if content.category.is_movie() {
        return Ok(None);
    }

    let resumed = progress
        .get(&content.id)
        .and_then(|record| record.episode_id.as_deref())
        .and_then(|episode_id| content.episode(episode_id));
    match resumed.or_else(|| content.episodes.first()) {
        Some(episode) => Ok(Some(episode)),
        None => bail!("`{}` has no episodes to play", content.id),
    }
}

fn run_play(store: &StoreAdapter, config: &Config, id: &str, episode: Option<&str>) -> Result<()> {
    let mut catalog = load_catalog(store);
    let content = find(&catalog, id)?;
    let episode = select_episode(content, episode, catalog.progress())?;
    let descriptor = PlayingDescriptor::start(content, episode, catalog.progress());

    if descriptor.resolved_url.is_empty() {
        println!("No video URL set for {}. Add one with `cinetrack edit`.", descriptor.title);
        return Ok(());
    }

    match &descriptor.subtitle {
        Some(subtitle) => println!("Playing {} ({subtitle})", descriptor.title),
        None => println!("Playing {}", descriptor.title),
    }
    if descriptor.start_offset_secs > 0.0 {
        println!("  Resuming at {}", format_position(descriptor.start_offset_secs));
    }
    if descriptor.mode == PlaybackMode::Embed {
        println!("  Opening embedded player; progress is not tracked for this source.");
    }

    let sink: &dyn ProgressSink = store;
    let outcome = with_interrupts_ignored(|| match descriptor.mode {
        PlaybackMode::Direct => {
            run_session(MpvSurface::new(config.player_bin()), descriptor, sink)
        }
        PlaybackMode::Embed => {
            run_session(OpenerSurface::new(config.opener_bin()), descriptor, sink)
        }
    });
    let end = match outcome {
        Ok(end) => end,
        Err(err) => {
            println!("Player launch failed: {err:#}");
            println!("Progress not updated.");
            return Ok(());
        }
    };
    debug!(saves = end.saves, last = ?end.last_position_secs, "session finished");

    catalog.set_progress(store.fetch_progress());
    match catalog.progress().get(id) {
        Some(record) => println!(
            "Saved position: {} ({})",
            format_position(record.position_secs),
            format_last_watched(record.last_updated_ms)
        ),
        None => println!("No progress saved."),
    }
    Ok(())
}

fn run_session<S: PlaybackSurface>(
    surface: S,
    descriptor: PlayingDescriptor,
    sink: &dyn ProgressSink,
) -> Result<SessionEnd> {
    let session = PlaybackSession::open(surface, descriptor, sink)?;
    Ok(session.run())
}

fn run_favorite(store: &StoreAdapter, id: &str) -> Result<()> {
    let mut catalog = load_catalog(store);
    let title = find(&catalog, id)?.title.clone();
    let updated = store.toggle_favorite(id, catalog.favorites());
    catalog.set_favorites(updated);

    if catalog.is_favorite(id) {
        println!("Added {title} to favorites.");
    } else {
        println!("Removed {title} from favorites.");
    }
    Ok(())
}

/// Layers command-line flags over a draft; flags that were not given keep
/// the draft's value.
pub(crate) fn draft_with_args(mut draft: EditDraft, args: &EditArgs) -> EditDraft {
    let EditArgs {
        title,
        description,
        poster,
        banner,
        category,
        relevance,
        year,
        age_rating,
        genres,
        video_url,
    } = args;

    if let Some(title) = title {
        draft.title = title.clone();
    }
    if let Some(description) = description {
        draft.description = description.clone();
    }
    if let Some(poster) = poster {
        draft.poster_url = poster.clone();
    }
    if let Some(banner) = banner {
        draft.banner_url = banner.clone();
    }
    if let Some(category) = category {
        draft.category = *category;
    }
    if let Some(relevance) = relevance {
        draft.relevance = *relevance;
    }
    if let Some(year) = year {
        draft.year = *year;
    }
    if let Some(age_rating) = age_rating {
        draft.age_rating = age_rating.clone();
    }
    if let Some(genres) = genres {
        draft.genres = genres.clone();
    }
    if let Some(video_url) = video_url {
        draft.video_url = video_url.clone();
    }
    draft
}

/// Draft a new entry starts from.
pub(crate) fn new_content_draft(id: &str, current_year: i32) -> EditDraft {
    let mut base = Content::placeholder(id, current_year);
    base.relevance = NEW_CONTENT_RELEVANCE;
    EditDraft::from_content(&base)
}

fn save_patch(store: &StoreAdapter, catalog: &mut Catalog, id: &str, patch: &OverridePatch) {
    let saved = catalog.upsert(id, patch);
    info!(content_id = id, title = %saved.title, "content saved");
    store.save_override(id, patch);
}

fn run_create(store: &StoreAdapter, fields: &EditArgs) -> Result<()> {
    let mut catalog = load_catalog(store);
    let id = new_content_id(Utc::now().timestamp_millis());
    let draft = draft_with_args(new_content_draft(&id, current_year()), fields);
    save_patch(store, &mut catalog, &id, &draft.into_patch());

    let created = find(&catalog, &id)?;
    println!("Created {} ({}) as {}", created.title, created.category, created.id);
    Ok(())
}

fn run_edit(store: &StoreAdapter, id: &str, fields: &EditArgs) -> Result<()> {
    let mut catalog = load_catalog(store);
    let draft = draft_with_args(EditDraft::from_content(find(&catalog, id)?), fields);
    save_patch(store, &mut catalog, id, &draft.into_patch());

    let edited = find(&catalog, id)?;
    println!("Updated {} ({})", edited.title, edited.id);
    Ok(())
}

/// Patch carrying a content's episode list and the category it implies.
pub(crate) fn episode_patch(content: &Content) -> OverridePatch {
    OverridePatch {
        category: Some(content.category),
        episodes: Some(content.episodes.clone()),
        ..OverridePatch::default()
    }
}

/// Copies the flags that were given onto `episode`; the id never changes.
fn apply_episode_fields(episode: &mut Episode, fields: &EpisodeFields) {
    if let Some(title) = &fields.title {
        episode.title = title.clone();
    }
    if let Some(url) = &fields.url {
        episode.video_url = url.clone();
    }
    if let Some(duration) = fields.duration {
        episode.duration_secs = duration;
    }
    if let Some(description) = &fields.description {
        episode.description = description.clone();
    }
    if let Some(thumbnail) = &fields.thumbnail {
        episode.thumbnail_url = thumbnail.clone();
    }
}

pub(crate) fn fill_new_episode(mut content: Content, fields: &EpisodeFields) -> Content {
    if let Some(episode) = content.episodes.last_mut() {
        apply_episode_fields(episode, fields);
    }
    content
}

/// Returns `None` when no episode has `episode_id`.
pub(crate) fn edit_episode(
    content: &Content,
    episode_id: &str,
    fields: &EpisodeFields,
) -> Option<Content> {
    let mut updated = content.clone();
    let episode = updated
        .episodes
        .iter_mut()
        .find(|episode| episode.id == episode_id)?;
    apply_episode_fields(episode, fields);
    Some(updated)
}

fn run_add_episode(store: &StoreAdapter, args: &EpisodeArgs) -> Result<()> {
    let mut catalog = load_catalog(store);
    let content = find(&catalog, &args.id)?;
    let was_movie = content.category.is_movie();
    let updated = fill_new_episode(
        add_episode(content, Utc::now().timestamp_millis()),
        &args.fields,
    );

    save_patch(store, &mut catalog, &args.id, &episode_patch(&updated));
    if let Some(episode) = updated.episodes.last() {
        println!("Added {} ({}) to {}", episode.title, episode.id, updated.title);
    }
    if was_movie {
        println!("  {} is now listed as {}.", updated.title, updated.category);
    }
    Ok(())
}

fn run_edit_episode(
    store: &StoreAdapter,
    id: &str,
    episode_id: &str,
    fields: &EpisodeFields,
) -> Result<()> {
    let mut catalog = load_catalog(store);
    let content = find(&catalog, id)?;
    let Some(updated) = edit_episode(content, episode_id, fields) else {
        bail!("`{id}` has no episode `{episode_id}`");
    };

    save_patch(store, &mut catalog, id, &episode_patch(&updated));
    println!("Updated episode {episode_id} of {}", updated.title);
    Ok(())
}

fn run_remove_episode(store: &StoreAdapter, id: &str, episode_id: &str) -> Result<()> {
    let mut catalog = load_catalog(store);
    let content = find(&catalog, id)?;
    let Some(updated) = remove_episode(content, episode_id) else {
        bail!("`{id}` has no episode `{episode_id}`");
    };

    save_patch(store, &mut catalog, id, &episode_patch(&updated));
    println!("Removed episode {episode_id} from {}", updated.title);
    Ok(())
}

fn run_upload(store: &StoreAdapter, config: &Config, path: &Path) -> Result<()> {
    if config.remote().is_none() {
        println!("Uploads need a remote. Set {ENV_REMOTE_URL} and {ENV_REMOTE_KEY} first.");
        return Ok(());
    }
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file", path.display()))?;

    match store.upload_image(&file_name, &bytes) {
        Some(url) => println!("{url}"),
        None => println!(
            "Image upload failed. Check that the `images` storage bucket exists and is public."
        ),
    }
    Ok(())
}

fn run_resolve(url: &str) {
    let source = resolver::resolve(Some(url));
    if !source.is_playable() {
        println!("No playable URL.");
        return;
    }
    println!("{}", source.playable_url);
    println!("  mode: {}", source.mode);
}
