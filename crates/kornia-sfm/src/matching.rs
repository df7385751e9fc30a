use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;

use crate::{tracks::ImageMatchKey, ImageId};

/// Errors that can occur when running the matching driver.
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    /// The worker count must be at least one.
    #[error("invalid worker count: {0}")]
    InvalidWorkerCount(usize),

    /// The worker pool could not be created.
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Outcome counts of a matching run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchingReport {
    /// Candidate pairs the matcher was run on.
    pub attempted: usize,
    /// Attempted pairs that produced no correspondence.
    pub empty: usize,
    /// Candidate pairs the matcher declined.
    pub skipped: usize,
}

impl MatchingReport {
    fn merge(mut self, other: Self) -> Self {
        self.attempted += other.attempted;
        self.empty += other.empty;
        self.skipped += other.skipped;
        self
    }
}

type ImageMatches<M> = (Vec<(ImageMatchKey, Vec<M>)>, MatchingReport);

fn match_image<M, F>(im1: &ImageId, candidates: &[ImageId], matcher: &F) -> ImageMatches<M>
where
    F: Fn(&ImageId, &ImageId) -> Option<Vec<M>>,
{
    let mut report = MatchingReport::default();
    let mut matches = Vec::with_capacity(candidates.len());
    for im2 in candidates {
        match matcher(im1, im2) {
            Some(m) => {
                report.attempted += 1;
                if m.is_empty() {
                    report.empty += 1;
                }
                matches.push(((im1.clone(), im2.clone()), m));
            }
            None => report.skipped += 1,
        }
    }
    log::debug!(
        "image {} matched against {} of {} candidates",
        im1,
        report.attempted,
        candidates.len()
    );
    (matches, report)
}

/// Run a pair matcher over the per-image candidate lists.
///
/// The matcher returns `None` when it does not attempt a pair and `Some(matches)`
/// otherwise, possibly empty. Only attempted pairs are in the result, so a missing
/// pair was never matched while an empty entry was matched without correspondences.
///
/// Images are processed independently on a pool of `processes` threads, or on the
/// calling thread when `processes` is 1.
///
/// # Arguments
///
/// * `per_image` - Candidate images of every image, as built by [`crate::pairs::per_image`].
/// * `processes` - Number of worker threads.
/// * `matcher` - Matches one image pair.
pub fn match_pairs<M, F>(
    per_image: &BTreeMap<ImageId, Vec<ImageId>>,
    processes: usize,
    matcher: F,
) -> Result<(HashMap<ImageMatchKey, Vec<M>>, MatchingReport), MatchingError>
where
    M: Send,
    F: Fn(&ImageId, &ImageId) -> Option<Vec<M>> + Sync,
{
    if processes == 0 {
        return Err(MatchingError::InvalidWorkerCount(processes));
    }

    let work: Vec<(&ImageId, &Vec<ImageId>)> = per_image.iter().collect();
    log::info!(
        "matching {} image pairs with {} workers",
        work.iter().map(|(_, c)| c.len()).sum::<usize>(),
        processes
    );

    let per_image_matches: Vec<ImageMatches<M>> = if processes == 1 {
        work.iter()
            .map(|(im1, candidates)| match_image(im1, candidates, &matcher))
            .collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(processes)
            .build()?;
        pool.install(|| {
            work.par_iter()
                .map(|(im1, candidates)| match_image(im1, candidates, &matcher))
                .collect()
        })
    };

    let mut matches = HashMap::new();
    let mut report = MatchingReport::default();
    for (image_matches, image_report) in per_image_matches {
        matches.extend(image_matches);
        report = report.merge(image_report);
    }

    log::info!(
        "matched {} pairs ({} without correspondences, {} skipped)",
        report.attempted,
        report.empty,
        report.skipped
    );
    Ok((matches, report))
}
