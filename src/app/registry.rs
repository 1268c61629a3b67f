//! Immutable plugin registry: entrypoint resolution across plugins and
//! first-match route dispatch within one.
use std::sync::Arc;

use crate::app::plugin::{Handler, Plugin, PluginError};
use crate::domain::model::ScrapeConfig;

/// The set of compiled-in plugins. Built once at startup and handed to the
/// worker pool, the scheduler and the API by reference; never mutated after
/// construction.
#[derive(Debug)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Result<Self, PluginError> {
        let mut seen = std::collections::HashSet::new();
        for p in &plugins {
            if !seen.insert(p.name()) {
                return Err(PluginError::DuplicateName(p.name().to_string()));
            }
        }
        Ok(Self { plugins })
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Returns the first plugin that accepts `url` as an entrypoint and is
    /// not blacklisted. The blacklist lets feed creation retry with the next
    /// claimant when a plugin's config creator fails on an ambiguous URL.
    pub fn plugin_for_entrypoint(
        &self,
        url: &str,
        blacklist: &[String],
    ) -> Result<Arc<dyn Plugin>, PluginError> {
        let probe = ScrapeConfig::from_entrypoints(vec![url.to_string()]);
        for p in &self.plugins {
            if blacklist.iter().any(|b| b == p.name()) {
                continue;
            }
            if p.validate_config(&probe).is_ok() {
                return Ok(p.clone());
            }
        }
        Err(PluginError::NoPluginFound(url.to_string()))
    }

    /// Resolves a task URL against a plugin's ordered route table. Returns
    /// the handler plus positional route params (full match first, then
    /// capture groups). No match means the task is unroutable and must not
    /// be retried.
    pub fn dispatch(plugin: &dyn Plugin, url: &str) -> Option<(Handler, Vec<String>)> {
        for route in plugin.routes() {
            if let Some(caps) = route.pattern.captures(url) {
                let params = caps
                    .iter()
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                return Some((route.handler.clone(), params));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::plugin::{HandlerResponse, Route};
    use crate::domain::model::{ScrapeSchedule, ScheduleRequest};
    use chrono::{DateTime, Utc};

    struct FakePlugin {
        name: &'static str,
        accepts: &'static str,
        routes: Vec<Route>,
    }

    impl FakePlugin {
        fn new(name: &'static str, accepts: &'static str, patterns: &[&str]) -> Self {
            let routes = patterns
                .iter()
                .map(|p| {
                    Route::new(p, |_cancel, _opts, _task| async {
                        Ok(HandlerResponse::default())
                    })
                    .unwrap()
                })
                .collect();
            Self {
                name,
                accepts,
                routes,
            }
        }
    }

    #[async_trait::async_trait]
    impl Plugin for FakePlugin {
        fn name(&self) -> &'static str {
            self.name
        }

        fn validate_config(&self, config: &ScrapeConfig) -> Result<(), PluginError> {
            for e in &config.entrypoints {
                if !e.contains(self.accepts) {
                    return Err(PluginError::InvalidConfig(format!(
                        "{} cannot scrape {e}",
                        self.name
                    )));
                }
            }
            Ok(())
        }

        async fn create_config(
            &self,
            url: &str,
            _opts: &crate::app::plugin::HandlerOpts,
        ) -> Result<(String, ScrapeConfig), PluginError> {
            Ok((
                url.to_string(),
                ScrapeConfig::from_entrypoints(vec![url.to_string()]),
            ))
        }

        fn propose_schedules(
            &self,
            _request: &ScheduleRequest,
            _now: DateTime<Utc>,
        ) -> Vec<ScrapeSchedule> {
            Vec::new()
        }

        fn routes(&self) -> &[Route] {
            &self.routes
        }
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::new(vec![
            Arc::new(FakePlugin::new("alpha", "alpha.example", &[])),
            Arc::new(FakePlugin::new("beta", "example", &[])),
        ])
        .unwrap()
    }

    #[test]
    fn first_accepting_plugin_wins() {
        let r = registry();
        let p = r
            .plugin_for_entrypoint("https://alpha.example/s/1", &[])
            .unwrap();
        assert_eq!(p.name(), "alpha");
    }

    #[test]
    fn blacklist_skips_to_next_claimant() {
        let r = registry();
        let p = r
            .plugin_for_entrypoint("https://alpha.example/s/1", &["alpha".to_string()])
            .unwrap();
        assert_eq!(p.name(), "beta");
    }

    #[test]
    fn no_plugin_found_for_unclaimed_url() {
        let r = registry();
        let err = r
            .plugin_for_entrypoint("https://other.site/x", &[])
            .unwrap_err();
        assert!(matches!(err, PluginError::NoPluginFound(_)));
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = PluginRegistry::new(vec![
            Arc::new(FakePlugin::new("alpha", "a", &[])),
            Arc::new(FakePlugin::new("alpha", "b", &[])),
        ])
        .unwrap_err();
        assert!(matches!(err, PluginError::DuplicateName(_)));
    }

    #[test]
    fn dispatch_takes_first_match_and_exposes_captures() {
        let plugin = FakePlugin::new(
            "alpha",
            "example",
            &[
                r"https://example\.com/s/(\w+)/(\d+)",
                r"https://example\.com/.*",
            ],
        );
        let (_, params) =
            PluginRegistry::dispatch(&plugin, "https://example.com/s/story/42").unwrap();
        assert_eq!(params[0], "https://example.com/s/story/42");
        assert_eq!(params[1], "story");
        assert_eq!(params[2], "42");

        let (_, params) = PluginRegistry::dispatch(&plugin, "https://example.com/about").unwrap();
        assert_eq!(params.len(), 1);

        assert!(PluginRegistry::dispatch(&plugin, "https://nowhere.net/").is_none());
    }
}
