//! Built-in shortcodes.

use quire_core::Value;

use crate::template::TemplateHelpers;

/// Raw `body` of the content record passed as the first argument.
#[must_use]
pub fn entry_body(args: &[Value]) -> String {
    args.first()
        .and_then(|record| record.get("body"))
        .filter(|body| body.is_truthy())
        .map(Value::to_string)
        .unwrap_or_default()
}

/// Register the built-in shortcodes that need no build state.
pub fn register(helpers: &mut TemplateHelpers) {
    helpers.add_shortcode("entry_body", entry_body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_body_untouched() {
        let mut record = Value::map();
        record.insert("body", "## Hi\n\n*raw*");
        assert_eq!(entry_body(&[record]), "## Hi\n\n*raw*");
    }

    #[test]
    fn test_missing_body_or_argument() {
        assert_eq!(entry_body(&[Value::map()]), "");
        assert_eq!(entry_body(&[Value::Null]), "");
        assert_eq!(entry_body(&[]), "");
    }

    #[test]
    fn test_renders_through_template() {
        let mut helpers = TemplateHelpers::new();
        register(&mut helpers);

        let mut page = Value::map();
        page.insert("body", "Hello *there*");
        let context = crate::template::TemplateContext::new().with_var("page", page);

        let template = crate::template::Template::new("t", "[{% entry_body page %}]");
        assert_eq!(
            template.render(&context, &helpers).unwrap(),
            "[Hello *there*]"
        );
    }
}
