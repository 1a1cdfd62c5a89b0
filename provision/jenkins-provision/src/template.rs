//! Placeholder rendering for XML and Groovy artifacts
//!
//! Placeholders look like `__REPO_URL__`. Substituted values are spliced in
//! verbatim and never rescanned, so a secret that happens to contain the
//! placeholder syntax cannot trigger a second expansion.

use anyhow::Result;
use regex::Regex;

/// Replace every `__KEY__` placeholder in `template` with its value.
///
/// Fails when the template contains a placeholder with no matching value;
/// unused values are fine.
pub fn render(template: &str, values: &[(&str, &str)]) -> Result<String> {
    let placeholder = Regex::new(r"__([A-Z0-9_]+?)__").unwrap();

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for found in placeholder.find_iter(template) {
        let text = found.as_str();
        let key = &text[2..text.len() - 2];
        let value = values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| anyhow::anyhow!("template placeholder {} has no value", text))?;
        out.push_str(&template[last..found.start()]);
        out.push_str(value);
        last = found.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Escape a value for interpolation into XML text or attributes.
pub fn escape_xml(value: &str) -> String {
    // Ampersand first so the other entities are not double escaped
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Escape a value for interpolation into a single quoted Groovy string.
pub fn escape_groovy(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_all_placeholders() {
        let rendered = render(
            "url=__REPO_URL__ branch=__BRANCH__ again=__BRANCH__",
            &[("REPO_URL", "https://github.com/acme/storefront.git"), ("BRANCH", "main")],
        )
        .unwrap();
        assert_eq!(
            rendered,
            "url=https://github.com/acme/storefront.git branch=main again=main"
        );
    }

    #[test]
    fn test_render_fails_on_missing_value() {
        let err = render("name=__REPO_SLUG__", &[("BRANCH", "main")]).unwrap_err();
        assert!(err.to_string().contains("__REPO_SLUG__"));
    }

    #[test]
    fn test_render_does_not_rescan_substituted_values() {
        let rendered = render("v=__A__", &[("A", "__B__"), ("B", "nope")]).unwrap();
        assert_eq!(rendered, "v=__B__");
    }

    #[test]
    fn test_render_leaves_build_time_syntax_alone() {
        // {{name}} placeholders belong to the deployer's build-time phase.
        let rendered = render("{{bucket}}/__OBJECT__", &[("OBJECT", "app")]).unwrap();
        assert_eq!(rendered, "{{bucket}}/app");
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml(r#"a<b>&"c"'d'"#),
            "a&lt;b&gt;&amp;&quot;c&quot;&apos;d&apos;"
        );
        assert_eq!(escape_xml("&amp;"), "&amp;amp;");
    }

    #[test]
    fn test_escape_groovy() {
        assert_eq!(escape_groovy(r"pa'ss\word"), r"pa\'ss\\word");
    }
}
