use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use leaven_common::{Candidate, EvidenceSource};

use super::{html, EvidenceFetcher, FetchError, FetchOutcome, PageFetcher};

/// Most handles to try per platform.
pub const MAX_HANDLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocialPlatform {
    Instagram,
    Facebook,
    TikTok,
}

impl SocialPlatform {
    pub const ALL: [SocialPlatform; 3] = [
        SocialPlatform::Instagram,
        SocialPlatform::Facebook,
        SocialPlatform::TikTok,
    ];

    pub fn profile_url(&self, handle: &str) -> String {
        match self {
            SocialPlatform::Instagram => format!("https://www.instagram.com/{handle}/"),
            SocialPlatform::Facebook => format!("https://www.facebook.com/{handle}"),
            SocialPlatform::TikTok => format!("https://www.tiktok.com/@{handle}"),
        }
    }
}

impl fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocialPlatform::Instagram => "instagram",
            SocialPlatform::Facebook => "facebook",
            SocialPlatform::TikTok => "tiktok",
        };
        f.write_str(name)
    }
}

/// Plausible handles for a business name: words squashed together, then
/// joined with `_`, then with `.`. Only ASCII alphanumerics survive.
pub fn candidate_handles(name: &str) -> Vec<String> {
    let words: Vec<String> = name
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut handles = vec![words.concat(), words.join("_"), words.join(".")];
    handles.dedup();
    handles.truncate(MAX_HANDLES);
    handles
}

/// Best-effort bio lookup on public profile pages. Unreachable profiles are
/// expected and never reported as errors.
pub struct SocialBioFetcher {
    pages: Arc<dyn PageFetcher>,
    enabled: bool,
}

impl SocialBioFetcher {
    pub fn new(pages: Arc<dyn PageFetcher>) -> Self {
        Self {
            pages,
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    async fn bio_on(&self, platform: SocialPlatform, handles: &[String]) -> Option<String> {
        for handle in handles {
            let url = platform.profile_url(handle);
            match self.pages.get(&url).await {
                Ok(page) => {
                    if let Some(bio) = html::meta_bio(&page) {
                        debug!(%platform, handle = handle.as_str(), "Found social bio");
                        return Some(bio);
                    }
                }
                Err(e) => debug!(%platform, handle = handle.as_str(), error = %e, "No profile"),
            }
        }
        None
    }
}

#[async_trait]
impl EvidenceFetcher for SocialBioFetcher {
    fn source(&self) -> EvidenceSource {
        EvidenceSource::SocialBio
    }

    async fn fetch(&self, candidate: &Candidate) -> Result<FetchOutcome, FetchError> {
        if !self.enabled {
            return Ok(FetchOutcome::Unavailable("social lookup disabled".into()));
        }
        let handles = candidate_handles(&candidate.name);
        if handles.is_empty() {
            return Ok(FetchOutcome::Unavailable("no plausible handle".into()));
        }

        let mut bios = Vec::new();
        for platform in SocialPlatform::ALL {
            if let Some(bio) = self.bio_on(platform, &handles).await {
                bios.push(bio);
            }
        }

        if bios.is_empty() {
            Ok(FetchOutcome::Unavailable("no resolvable social profile".into()))
        } else {
            Ok(FetchOutcome::Text(bios.join("\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPageFetcher;

    fn named(name: &str) -> Candidate {
        Candidate::new(name, "", "Portland", "OR")
    }

    #[test]
    fn handles_from_name() {
        assert_eq!(
            candidate_handles("Ken's Artisan Pizza"),
            vec!["kensartisanpizza", "kens_artisan_pizza", "kens.artisan.pizza"]
        );
        assert_eq!(candidate_handles("Lovely's"), vec!["lovelys"]);
        assert!(candidate_handles("  &  ").is_empty());
    }

    #[tokio::test]
    async fn collects_bios_across_platforms() {
        let pages = Arc::new(MockPageFetcher::new()
            .on_page(
                "https://www.instagram.com/pizza_a/",
                r#"<html><head><meta property="og:description" content="Naturally leavened pies"></head></html>"#,
            )
            .on_page(
                "https://www.tiktok.com/@pizzaa",
                r#"<html><head><meta name="description" content="Wild yeast everything"></head></html>"#,
            ));
        let fetcher = SocialBioFetcher::new(pages.clone());

        match fetcher.fetch(&named("Pizza A")).await.unwrap() {
            FetchOutcome::Text(text) => {
                assert!(text.contains("Naturally leavened pies"));
                assert!(text.contains("Wild yeast everything"));
            }
            other => panic!("expected text, got {other:?}"),
        }

        // Each platform stops at its first bio.
        assert_eq!(
            pages.requested(),
            vec![
                "https://www.instagram.com/pizzaa/",
                "https://www.instagram.com/pizza_a/",
                "https://www.facebook.com/pizzaa",
                "https://www.facebook.com/pizza_a",
                "https://www.facebook.com/pizza.a",
                "https://www.tiktok.com/@pizzaa",
            ]
        );
    }

    #[tokio::test]
    async fn no_profiles_is_unavailable_not_error() {
        let fetcher = SocialBioFetcher::new(Arc::new(MockPageFetcher::new()));
        assert!(matches!(
            fetcher.fetch(&named("Pizza A")).await,
            Ok(FetchOutcome::Unavailable(_))
        ));

        let disabled = SocialBioFetcher::new(Arc::new(MockPageFetcher::new())).enabled(false);
        assert_eq!(
            disabled.fetch(&named("Pizza A")).await,
            Ok(FetchOutcome::Unavailable("social lookup disabled".into()))
        );
    }
}
