//! Static per-site rule tables
//!
//! One rule per feature flag. A rule either hides a list of selectors or
//! installs a literal stylesheet fragment; either way it is keyed by a rule
//! id that is unique within its site.

/// How a rule suppresses its surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleBody {
    /// Selectors forced to `display: none`
    Hide(&'static [&'static str]),
    /// Literal CSS lines, installed as written
    Stylesheet(&'static [&'static str]),
}

/// Mapping from a feature flag to its suppression rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRule {
    pub feature: &'static str,
    pub id: &'static str,
    pub body: RuleBody,
}

/// All rules of one site and the hosts the site is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteRules {
    pub key: &'static str,
    pub domains: &'static [&'static str],
    pub rules: &'static [FeatureRule],
}

impl SiteRules {
    pub fn rule(&self, feature: &str) -> Option<&'static FeatureRule> {
        self.rules.iter().find(|rule| rule.feature == feature)
    }

    pub fn rule_by_id(&self, id: &str) -> Option<&'static FeatureRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }
}

// =============================================================================
// Rule Tables
// =============================================================================

pub static FACEBOOK: SiteRules = SiteRules {
    key: "facebook",
    domains: &["facebook.com"],
    rules: &[
        FeatureRule {
            feature: "hideNewsFeed",
            id: "facebook-feed",
            body: RuleBody::Hide(&[
                r#"[role="feed"]"#,
                r#"div[data-pagelet^="FeedUnit"]"#,
                r#"div[data-pagelet^="FeedStory"]"#,
                r#"div[data-pagelet="WorkStories"]"#,
                r#"div[aria-label="News Feed"]"#,
                r#"div[aria-label="Main content"] [role="main"] > div > div > div > div"#,
            ]),
        },
        FeatureRule {
            feature: "hideStories",
            id: "facebook-stories",
            body: RuleBody::Hide(&[
                r#"div[data-pagelet="Stories"]"#,
                r#"div[aria-label="Stories"]"#,
                r#"div[aria-label="Stories tray"]"#,
                r#"div[data-pagelet^="StoriesTray"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideWatch",
            id: "facebook-watch",
            body: RuleBody::Hide(&[
                r#"a[aria-label="Watch"]"#,
                r#"a[href="/watch/"]"#,
                r#"a[href^="/watch/?"]"#,
                r#"a[href="/watch/?ref=tab"]"#,
                r#"a[aria-label="Video"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideMarketplace",
            id: "facebook-marketplace",
            body: RuleBody::Hide(&[
                r#"a[aria-label="Marketplace"]"#,
                r#"a[href="/marketplace/?ref=bookmark"]"#,
                r#"a[href^="/marketplace/?"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideNotifications",
            id: "facebook-notifications",
            body: RuleBody::Hide(&[
                r#"div[aria-label="Notifications"]"#,
                r#"div[aria-label="Notifications, tab 1 of 2"]"#,
                r#"a[aria-label="Notifications"]"#,
            ]),
        },
    ],
};

pub static YOUTUBE: SiteRules = SiteRules {
    key: "youtube",
    domains: &["youtube.com"],
    rules: &[
        FeatureRule {
            feature: "hideHomeFeed",
            id: "youtube-home-feed",
            body: RuleBody::Stylesheet(&[
                r#"ytd-browse[page-subtype="home"] ytd-rich-grid-renderer { display: none !important; }"#,
                r#"ytd-browse[page-subtype="home"] ytd-two-column-browse-results-renderer #primary { display: none !important; }"#,
            ]),
        },
        FeatureRule {
            feature: "hideSidebar",
            id: "youtube-sidebar",
            body: RuleBody::Hide(&[
                "#related",
                "ytd-watch-next-secondary-results-renderer",
                "ytd-merch-shelf-renderer",
                "#secondary #secondary-inner",
                "ytd-mini-guide-renderer",
                "#guide-inner-content",
            ]),
        },
        FeatureRule {
            feature: "hideComments",
            id: "youtube-comments",
            body: RuleBody::Hide(&["#comments", "ytd-comments", "ytd-comment-thread-renderer"]),
        },
        FeatureRule {
            feature: "hideEndscreen",
            id: "youtube-endscreen",
            body: RuleBody::Stylesheet(&[
                ".ytp-endscreen-content { display: none !important; }",
                ".ytp-ce-element { display: none !important; }",
                ".ytp-ce-covering-overlay { display: none !important; }",
                ".ytp-ce-element-shadow { display: none !important; }",
            ]),
        },
        FeatureRule {
            feature: "hideShorts",
            id: "youtube-shorts",
            body: RuleBody::Hide(&[
                r#"ytd-rich-section-renderer[section-identifier="shorts-shelf"]"#,
                "ytd-reel-shelf-renderer",
                r#"a[title="Shorts"]"#,
                r#"ytd-guide-section-renderer a[title="Shorts"]"#,
                "ytd-rich-grid-slim-media[is-short]",
                "#endpoint[title='Shorts']",
            ]),
        },
    ],
};

pub static TWITTER: SiteRules = SiteRules {
    key: "twitter",
    domains: &["twitter.com", "x.com"],
    rules: &[
        FeatureRule {
            feature: "hideHomeTimeline",
            id: "twitter-home",
            body: RuleBody::Hide(&[
                r#"main[role="main"] section[aria-labelledby^="accessible-list"]"#,
                r#"main[role="main"] [data-testid="primaryColumn"] section div[data-testid="cellInnerDiv"]"#,
                r#"main[role="main"] [data-testid="timeline"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideTrends",
            id: "twitter-trends",
            body: RuleBody::Hide(&[
                r#"aside[aria-label="Trending"]"#,
                r#"section[aria-labelledby^="accessible-list-"] [data-testid="trend"]"#,
                r#"a[href="/explore/tabs/trending"]"#,
                r#"[aria-label="Timeline: Trending now"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideWhoToFollow",
            id: "twitter-who-to-follow",
            body: RuleBody::Hide(&[
                r#"[aria-label="Who to follow"]"#,
                r#"section[aria-labelledby^="accessible-list-"] [data-testid="UserCell"]"#,
                r#"div[data-testid="sidebarColumn"] [data-testid="UserCell"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideNotifications",
            id: "twitter-notifications",
            body: RuleBody::Hide(&[
                r#"a[aria-label="Notifications"]"#,
                r#"a[href="/notifications"]"#,
                r#"a[href="/notifications/mentions"]"#,
            ]),
        },
    ],
};

pub static REDDIT: SiteRules = SiteRules {
    key: "reddit",
    domains: &["reddit.com"],
    rules: &[
        FeatureRule {
            feature: "hideHomeFeed",
            id: "reddit-feed",
            body: RuleBody::Hide(&[
                r#"main[role="main"] .rpBJOHq2PR60pnwJlUyP0"#,
                r#"main[role="main"] [data-testid="post-container"]"#,
                r#"div[data-testid="post-list"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideTrending",
            id: "reddit-trending",
            body: RuleBody::Hide(&[
                r#"[data-testid="trending-subreddits"]"#,
                r#"[data-testid="trending-content"]"#,
                r#"div[data-testid="trendingPosts"]"#,
                r#"div[data-testid="trendingToday"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideSidebar",
            id: "reddit-sidebar",
            body: RuleBody::Hide(&[
                r#"aside[data-testid="right-sidebar"]"#,
                ".ListingLayout-outerContainer > .ListingLayout-sidebar",
                r#"div[data-testid="widgets-column"]"#,
            ]),
        },
    ],
};

pub static LINKEDIN: SiteRules = SiteRules {
    key: "linkedin",
    domains: &["linkedin.com"],
    rules: &[
        FeatureRule {
            feature: "hideFeed",
            id: "linkedin-feed",
            body: RuleBody::Hide(&[
                "main.scaffold-layout__main",
                ".scaffold-layout__main",
                ".feed-shared-update-v2",
                "div[data-view-name='feed_all_updates']",
            ]),
        },
        FeatureRule {
            feature: "hideNotifications",
            id: "linkedin-notifications",
            body: RuleBody::Hide(&[
                r#"a[data-test-global-nav-link="notifications"]"#,
                r#"a[href*="/notifications/"]"#,
                r#"button[data-test-global-nav-link="notifications"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideMessaging",
            id: "linkedin-messaging",
            body: RuleBody::Hide(&[
                r#"a[data-test-global-nav-link="messaging"]"#,
                r#"button[data-test-global-nav-link="messaging"]"#,
                ".msg-overlay-list-bubble",
                ".msg-overlay-container",
            ]),
        },
    ],
};

pub static INSTAGRAM: SiteRules = SiteRules {
    key: "instagram",
    domains: &["instagram.com"],
    rules: &[
        FeatureRule {
            feature: "hideFeed",
            id: "instagram-feed",
            body: RuleBody::Hide(&[
                r#"main[role="main"] article"#,
                r#"main[role="main"] section"#,
                r#"div[role="main"] article"#,
                r#"div[role="main"] main > div > div"#,
            ]),
        },
        FeatureRule {
            feature: "hideStories",
            id: "instagram-stories",
            body: RuleBody::Hide(&[
                r#"main[role="main"] [aria-label="Stories"]"#,
                r#"main[role="main"] section[aria-label="Stories"]"#,
                r#"main[role="main"] div[style*="--base-tray-height"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideExplore",
            id: "instagram-explore",
            body: RuleBody::Hide(&[
                r#"a[href="/explore/"]"#,
                r#"a[href^="/explore/"]"#,
                r#"[role="navigation"] a[href="/explore/"]"#,
            ]),
        },
        FeatureRule {
            feature: "hideReels",
            id: "instagram-reels",
            body: RuleBody::Hide(&[
                r#"a[href="/reels/"]"#,
                r#"a[href^="/reels/"]"#,
                r#"main[role="main"] section[aria-label="Reels"]"#,
            ]),
        },
    ],
};

/// Every site with rules.
pub static SITES: &[&SiteRules] = &[&FACEBOOK, &YOUTUBE, &TWITTER, &REDDIT, &LINKEDIN, &INSTAGRAM];

pub fn site_rules(key: &str) -> Option<&'static SiteRules> {
    SITES.iter().copied().find(|site| site.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{site_default, SITE_DEFAULTS};
    use std::collections::HashSet;

    #[test]
    fn test_rule_ids_unique_per_site() {
        for site in SITES {
            let ids: HashSet<&str> = site.rules.iter().map(|rule| rule.id).collect();
            assert_eq!(ids.len(), site.rules.len(), "{}", site.key);
        }
    }

    #[test]
    fn test_every_feature_has_exactly_one_rule() {
        assert_eq!(SITES.len(), SITE_DEFAULTS.len());
        for site in SITES {
            let defaults = site_default(site.key).unwrap();
            assert_eq!(defaults.features.len(), site.rules.len(), "{}", site.key);
            for feature in defaults.features {
                assert!(site.rule(feature.key).is_some(), "{}.{}", site.key, feature.key);
            }
        }
    }

    #[test]
    fn test_rule_bodies_non_empty() {
        for site in SITES {
            for rule in site.rules {
                let lines = match rule.body {
                    RuleBody::Hide(selectors) => selectors,
                    RuleBody::Stylesheet(lines) => lines,
                };
                assert!(!lines.is_empty(), "{}", rule.id);
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(site_rules("reddit").map(|site| site.key), Some("reddit"));
        assert!(site_rules("myspace").is_none());
        assert_eq!(YOUTUBE.rule("hideComments").map(|rule| rule.id), Some("youtube-comments"));
        assert_eq!(YOUTUBE.rule_by_id("youtube-shorts").map(|rule| rule.feature), Some("hideShorts"));
    }
}
