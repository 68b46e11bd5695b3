use std::collections::HashSet;
use std::time::Instant;

use tracing::{info, warn};

use crate::catalog::{Catalog, KnownIdCache, QueueSource};
use crate::config::{HarvestConfig, HarvestOptions, Scope};
use crate::error::HarvestError;
use crate::fetch::PageFetcher;
use crate::invalidate::clear_movie_data_cache;
use crate::model::{QueueEntry, RunReport};
use crate::progress::{summary_lines, Progress};
use crate::scheduler::{partition, Scheduler};
use crate::session::SessionFactory;

/// Queue path form of a film URL: no scheme or host, one trailing slash.
///
/// `https://letterboxd.com/film/up`, `letterboxd.com/film/up` and `/film/up/`
/// all become `/film/up/`.
pub fn normalize_url_path(url: &str) -> String {
    let url = url.trim();
    let (has_scheme, rest) = match url.find("://") {
        Some(i) => (true, &url[i + 3..]),
        None => (false, url),
    };
    // Without a scheme, a leading segment containing a dot is still a host.
    let path = if rest.starts_with('/') {
        rest
    } else {
        match rest.split_once('/') {
            Some((first, _)) if has_scheme || first.contains('.') => &rest[first.len()..],
            None if has_scheme || rest.contains('.') => "/",
            _ => rest,
        }
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();

    let mut out = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        out.push('/');
    }
    out.push_str(path);
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Pending entries that still need harvesting, narrowed to `scope`.
///
/// Entries already in the catalog, deprecated entries and repeated ids are dropped.
pub fn select_candidates(
    pending: Vec<QueueEntry>,
    known_ids: &HashSet<String>,
    scope: &Scope,
) -> Vec<QueueEntry> {
    let mut seen = HashSet::new();
    let candidates = pending.into_iter().filter(|e| {
        !e.is_deprecated && !known_ids.contains(&e.movie_id) && seen.insert(e.movie_id.clone())
    });

    match scope {
        Scope::All => candidates.collect(),
        Scope::First(n) => candidates.take(*n).collect(),
        Scope::Single(url) => {
            let wanted = normalize_url_path(url);
            candidates
                .filter(|e| normalize_url_path(&e.url) == wanted)
                .take(1)
                .collect()
        }
    }
}

fn check_scope(scope: &Scope) -> Result<(), HarvestError> {
    match scope {
        Scope::First(0) => Err(HarvestError::InvalidScope(
            "number of movies must be positive".into(),
        )),
        Scope::Single(url) if normalize_url_path(url) == "/" => Err(HarvestError::InvalidScope(
            format!("{url:?} is not a movie url"),
        )),
        _ => Ok(()),
    }
}

/// Run one harvest: select candidates, fetch them window by window and
/// reconcile each batch with the store.
pub async fn run<S, F>(
    store: &S,
    cache: &KnownIdCache,
    factory: &F,
    config: &HarvestConfig,
    options: &HarvestOptions,
    progress: &Progress,
) -> Result<RunReport, HarvestError>
where
    S: QueueSource + Catalog,
    F: SessionFactory,
    F::Session: PageFetcher,
{
    check_scope(&options.scope)?;
    let started = Instant::now();

    let pending = store.get_pending_entries()?;
    let known_ids = cache.known_ids(store)?;
    let before = pending.len();
    let candidates = select_candidates(pending, &known_ids, &Scope::All);
    let filtered = before - candidates.len();
    if filtered > 0 {
        progress.println(format!(
            "🔍 Filtered out {} already-scraped movies; {} URLs remain in queue",
            filtered,
            candidates.len()
        ));
    }

    let candidates = match &options.scope {
        Scope::All => candidates,
        scope => select_candidates(candidates, &HashSet::new(), scope),
    };
    let mut report = RunReport::default();
    let session_refresh = config.session_refresh.max(1);
    let batches = partition(&candidates, config.batch_size);
    let total = candidates.len();
    if candidates.is_empty() {
        if matches!(options.scope, Scope::Single(_)) {
            progress.println("Movie url not in queue");
        } else {
            info!("No movies to scrape");
        }
    } else {
        progress.println("\n🚀 Starting movie scraping process:");
        progress.println(format!("   📊 Total movies to scrape: {total}"));
        progress.println(format!("   📦 Total batches: {}", batches.len()));
        progress.println(format!("   🔄 Session refresh every {session_refresh} batches"));
        progress.println(format!(
            "   ⚡ Batch size: {} movies per batch\n",
            config.batch_size.max(1)
        ));
    }

    let scheduler = Scheduler::new(config, progress, options.show_objects, batches.len());
    let sink = options.persist.then_some(store);

    for (w, window) in batches.chunks(session_refresh).enumerate() {
        let session_num = w + 1;
        let movies: usize = window.iter().map(|b| b.entries.len()).sum();
        progress.println(format!(
            "🔗 Session {}: Starting HTTP session for {} batches ({} movies)",
            session_num,
            window.len(),
            movies
        ));

        let session = factory.open(session_num)?;
        let results = scheduler.run_window(&session, window, sink).await;
        factory.close(session);

        for result in &results {
            report.record_batch(&result.report);
            report.record_status(result.status());
            if let Some(sync) = &result.sync {
                report.records_written += sync.upserted;
                report.deprecated_marked += sync.deprecated_marked;
                if sync.upserted > 0 {
                    cache.invalidate();
                }
            }
        }
        progress.println(format!("✅ Session {session_num} completed\n"));
    }

    for line in summary_lines(&report, total, started.elapsed(), options.persist) {
        progress.println(line);
    }

    if let Some(downstream) = &options.invalidate {
        if !clear_movie_data_cache(downstream).await {
            warn!("Downstream cache still holds stale movie data");
        }
    }

    Ok(report)
}
