//! Naming utilities for converting between template invocation names and module paths
//!
//! Angle-bracket invocations use PascalCase segments joined by `::`
//! (`<Foo::BarBaz />`), while modules live at kebab-case paths
//! (`components/foo/bar-baz`).

/// Convert a PascalCase segment to kebab-case
///
/// Handles acronyms (consecutive uppercase) the same way dasherize does:
/// - FooBar -> foo-bar
/// - XMLParser -> xml-parser
/// - HTTPClient -> http-client
pub fn pascal_to_kebab(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut result = String::with_capacity(name.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let prev_upper = prev.is_uppercase();
            let next_upper = chars.get(i + 1).is_some_and(|c| c.is_uppercase());
            let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());

            // New word after a lowercase letter or digit, or the last capital
            // of an acronym that starts the next word ("XMLParser" -> "P")
            let start_new_word = !prev_upper && !next_upper && prev != '-';
            let end_of_acronym = prev_upper && next_lower;

            if start_new_word || end_of_acronym {
                result.push('-');
            }
        }
        result.push(ch.to_ascii_lowercase());
    }

    result
}

/// Module path of an angle-bracket invocation name: `Foo::BarBaz` -> `foo/bar-baz`
pub fn invocation_to_path(name: &str) -> String {
    name.split("::")
        .map(pascal_to_kebab)
        .collect::<Vec<_>>()
        .join("/")
}

/// Is this a valid JS identifier we can bind an import to?
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Pick `base`, or `base` with the first free numeric suffix, avoiding `taken`
pub fn unique_binding<F>(base: &str, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    if !taken(base) {
        return base.to_string();
    }
    (0..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use crate::naming::*;

    #[test]
    fn test_pascal_to_kebab() {
        assert_eq!(pascal_to_kebab("FooBar"), "foo-bar");
        assert_eq!(pascal_to_kebab("Widget"), "widget");
        assert_eq!(pascal_to_kebab("XMLParser"), "xml-parser");
        assert_eq!(pascal_to_kebab("HTTPClient"), "http-client");
        assert_eq!(pascal_to_kebab("API"), "api");
        assert_eq!(pascal_to_kebab("Select2Box"), "select2-box");
    }

    #[test]
    fn test_invocation_to_path() {
        assert_eq!(invocation_to_path("Foo::BarBaz"), "foo/bar-baz");
        assert_eq!(invocation_to_path("UserCard"), "user-card");
        assert_eq!(invocation_to_path("Ui::Form::TextInput"), "ui/form/text-input");
    }

    #[test]
    fn test_unique_binding() {
        assert_eq!(unique_binding("TEMPLATE", |_| false), "TEMPLATE");
        assert_eq!(
            unique_binding("TEMPLATE", |n| n == "TEMPLATE" || n == "TEMPLATE0"),
            "TEMPLATE1"
        );
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("setComponentTemplate"));
        assert!(is_identifier("$el"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("foo-bar"));
        assert!(!is_identifier(""));
    }
}
