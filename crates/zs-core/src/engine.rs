//! Per-site rule engine
//!
//! Brings a page's style tree in line with one site's settings. The applied
//! state lives entirely in the keyed style elements, so `apply` can be
//! called any number of times, with any settings, in any order, and the
//! tree always ends up reflecting the last call.

use crate::config::Config;
use crate::document::SiteSettings;
use crate::rules::{site_rules, FeatureRule, RuleBody, SiteRules};
use crate::style::{hide_css, inject_style, remove_style, StyleChange, StyleHost};

pub struct RuleEngine<H> {
    site: &'static SiteRules,
    host: H,
    prefix: String,
}

impl<H: StyleHost> RuleEngine<H> {
    pub fn new(site: &'static SiteRules, host: H, config: &Config) -> Self {
        Self {
            site,
            host,
            prefix: config.style_prefix.clone(),
        }
    }

    /// Engine for a site key; `None` for sites without rules.
    pub fn for_site(key: &str, host: H, config: &Config) -> Option<Self> {
        site_rules(key).map(|site| Self::new(site, host, config))
    }

    pub fn site(&self) -> &'static SiteRules {
        self.site
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Apply a site's settings. Returns the number of active rules.
    pub fn apply(&mut self, settings: &SiteSettings) -> usize {
        if !settings.enabled() {
            self.disable_all();
            return 0;
        }

        let mut active_count = 0;
        for rule in self.site.rules {
            let active = settings.is_true(rule.feature);
            self.set_rule(rule, active);
            active_count += usize::from(active);
        }
        active_count
    }

    /// Remove every rule of this site from the page.
    pub fn disable_all(&mut self) {
        for rule in self.site.rules {
            self.set_rule(rule, false);
        }
    }

    pub fn set_rule(&mut self, rule: &FeatureRule, active: bool) -> StyleChange {
        match rule.body {
            RuleBody::Hide(selectors) => self.set_active(rule.id, selectors, active),
            RuleBody::Stylesheet(lines) => self.set_stylesheet(rule.id, &lines.join("\n"), active),
        }
    }

    /// Hide `selectors` under `rule_id`, or lift the rule.
    pub fn set_active(&mut self, rule_id: &str, selectors: &[&str], active: bool) -> StyleChange {
        if active {
            let id = self.style_id(rule_id);
            inject_style(&mut self.host, &id, &hide_css(selectors))
        } else {
            self.lift(rule_id)
        }
    }

    /// Install a literal stylesheet under `rule_id`, or lift the rule.
    pub fn set_stylesheet(&mut self, rule_id: &str, css: &str, active: bool) -> StyleChange {
        if active {
            let id = self.style_id(rule_id);
            inject_style(&mut self.host, &id, css)
        } else {
            self.lift(rule_id)
        }
    }

    /// Rule ids currently installed on the page, in style tree order.
    pub fn active_rules(&self) -> Vec<String> {
        self.host
            .style_ids(&self.prefix)
            .into_iter()
            .filter_map(|id| id.strip_prefix(self.prefix.as_str()).map(str::to_string))
            .collect()
    }

    fn lift(&mut self, rule_id: &str) -> StyleChange {
        let id = self.style_id(rule_id);
        remove_style(&mut self.host, &id)
    }

    fn style_id(&self, rule_id: &str) -> String {
        format!("{}{}", self.prefix, rule_id)
    }
}
