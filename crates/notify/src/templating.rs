//! Minijinja templates for every notification kind.
//!
//! Pilot names and free-text content are Markdown-escaped with the `md`
//! filter; links are pre-rendered Markdown and inserted verbatim.

use serde::Serialize;

use crate::telegram::escape_markdown;
use crate::traits::NotifyError;

/// First point of a new tracking session.
pub const SESSION_START: &str = "*{{ name | md }}* started tracking at {{ time }}\n{{ livetrack }}";

/// Check-in with statistics and pickup links.
pub const CHECK_IN: &str = "*{{ name | md }}* sent OK at {{ time }}\n\
Flight time: {{ flight_time }}\n\
Distance ALL/TO: {{ cum_dist | round(2) }}/{{ take_off_dist | round(2) }} km\n\
{{ livetrack }}\n\
{{ map }}\n\
{{ itinerary }}";

/// HELP, MOVE and CUSTOM messages.
pub const URGENT: &str = "*{{ name | md }}* sent {{ content | md }}!!!";

pub const RESUMED: &str = "*{{ name | md }}* started tracking again at {{ time }}";

pub const STOPPED: &str = "*{{ name | md }}* turned the tracking off at {{ time }}";

/// Renders notification templates.
#[derive(Debug)]
pub struct TemplateRenderer {
    env: minijinja::Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            env: Self::build_env(),
        }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("md", md_filter);
        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render<S: Serialize>(&self, template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        self.env
            .render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom filter: round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn md_filter(value: String) -> String {
    escape_markdown(&value)
}
