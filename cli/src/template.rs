//! Build-time rendering of bootstrap scripts
//!
//! Bootstrap scripts carry two placeholder namespaces. Build-time
//! placeholders use the `{{name}}` form and are substituted here, on the
//! operator's machine. Runtime placeholders use the `__NAME__` form and are
//! substituted on the target machine; this renderer passes them through
//! untouched. Rendering fails if any build-time placeholder is left over,
//! so a missing variable surfaces before anything reaches the platform.

use regex::Regex;

use crate::error::TemplateError;

/// A build-time template over `{{name}}` placeholders.
#[derive(Debug, Clone)]
pub struct BuildTemplate {
    text: String,
}

impl BuildTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Substitute every `{{key}}` with its value.
    ///
    /// # Errors
    /// Returns `TemplateError::UnresolvedPlaceholder` when a build-time
    /// placeholder remains after substitution.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
        let mut out = self.text.clone();
        for (key, value) in vars {
            out = out.replace(&format!("{{{{{}}}}}", key), value);
        }

        let leftover = Regex::new(r"\{\{([a-z0-9_]+)\}\}").unwrap();
        if let Some(cap) = leftover.captures(&out) {
            return Err(TemplateError::UnresolvedPlaceholder {
                placeholder: cap[1].to_string(),
            });
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_build_placeholders() {
        let template = BuildTemplate::new("port={{port}} path={{path}}");
        let out = template
            .render(&[("port", "8080"), ("path", "/healthz")])
            .unwrap();
        assert_eq!(out, "port=8080 path=/healthz");
    }

    #[test]
    fn test_render_fails_on_unresolved_placeholder() {
        let template = BuildTemplate::new("bucket={{bucket}}");
        let err = template.render(&[("port", "8080")]).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UnresolvedPlaceholder { ref placeholder } if placeholder == "bucket"
        ));
    }

    #[test]
    fn test_render_passes_runtime_placeholders_through() {
        let template = BuildTemplate::new("secret={{secret}} token=__GITHUB_TOKEN__");
        let out = template.render(&[("secret", "acme-dev-github-token")]).unwrap();
        assert_eq!(out, "secret=acme-dev-github-token token=__GITHUB_TOKEN__");
    }

    #[test]
    fn test_render_with_no_placeholders_is_identity() {
        let template = BuildTemplate::new("plain text");
        assert_eq!(template.render(&[]).unwrap(), "plain text");
    }
}
