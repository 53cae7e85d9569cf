//! Name references in Handlebars templates
//!
//! Templates refer to components and helpers by name: `<FooBar />`,
//! `<Foo::Bar />`, `{{foo-bar}}`, `{{#foo-bar}}`, `(foo-bar)` and
//! `{{component "foo-bar"}}`. A bare mustache inside an element's open tag,
//! as in `<input {{auto-focus}} />`, is an element modifier. Only names that
//! could denote a module are reported; built-in keywords, block params,
//! `this.` paths and `@args` are skipped.

use crate::errors::ScanError;
use crate::naming::invocation_to_path;
use once_cell::sync::Lazy;
use regex::Regex;

/// What a name may resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// Angle-bracket invocation or `{{component "x"}}`
    Component,
    /// Sub-expression head
    Helper,
    /// Mustache head; a component or a helper
    Either,
    /// Mustache in element position inside an open tag
    Modifier,
}

/// A name reference found in a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRef {
    /// The name as written
    pub name: String,
    /// Module path below `components/`, `helpers/` or `modifiers/`
    pub path: String,
    pub kind: NameKind,
    /// Byte offset of the name in the template
    pub offset: usize,
}

const BUILTIN_COMPONENTS: &[&str] = &["Input", "Textarea", "LinkTo"];

const BUILTIN_KEYWORDS: &[&str] = &[
    "-in-element",
    "-get-dynamic-var",
    "each-in",
    "has-block",
    "has-block-params",
    "in-element",
    "link-to",
    "query-params",
    "unique-id",
];

static COMMENT_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)\{\{!--.*?--\}\}|\{\{![^}]*\}\}").ok());
static BLOCK_PARAMS_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\bas\s*\|([^|]*)\|").ok());
static ANGLE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"<([A-Z][A-Za-z0-9]*(?:::[A-Z][A-Za-z0-9]*)*)[\s/>]").ok());
static MUSTACHE_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").ok());
static HEAD_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"^[\s~]*#?\s*([^\s}~()"']+)(?:\s+"([^"]+)")?"#).ok());
static SUBEXPR_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\(\s*([^\s()]+)").ok());
static NAME_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(?:[-/][a-z0-9]+)+$").ok());

fn pattern(
    re: &'static Lazy<Option<Regex>>,
    name: &'static str,
) -> Result<&'static Regex, ScanError> {
    Lazy::force(re).as_ref().ok_or(ScanError::Pattern(name))
}

/// Find every component/helper name reference in a template
pub fn scan_template(source: &str) -> Result<Vec<NameRef>, ScanError> {
    let comment_re = pattern(&COMMENT_RE, "comment")?;
    let block_params_re = pattern(&BLOCK_PARAMS_RE, "block-params")?;
    let angle_re = pattern(&ANGLE_RE, "angle")?;
    let mustache_re = pattern(&MUSTACHE_RE, "mustache")?;
    let head_re = pattern(&HEAD_RE, "head")?;
    let subexpr_re = pattern(&SUBEXPR_RE, "subexpression")?;
    let name_re = pattern(&NAME_RE, "name")?;

    // Blank out comments so offsets stay valid
    let masked = comment_re.replace_all(source, |caps: &regex::Captures<'_>| {
        " ".repeat(caps[0].len())
    });

    let modifiers = modifier_positions(&masked);
    let block_params: Vec<&str> = block_params_re
        .captures_iter(&masked)
        .filter_map(|c| c.get(1))
        .flat_map(|m| m.as_str().split_whitespace())
        .collect();

    let mut refs = Vec::new();

    for caps in angle_re.captures_iter(&masked) {
        let Some(m) = caps.get(1) else { continue };
        let name = m.as_str();
        let head = name.split("::").next().unwrap_or(name);
        if BUILTIN_COMPONENTS.contains(&name) || block_params.contains(&head) {
            continue;
        }
        refs.push(NameRef {
            name: name.to_string(),
            path: invocation_to_path(name),
            kind: NameKind::Component,
            offset: m.start(),
        });
    }

    let is_module_name = |name: &str| {
        name_re.is_match(name)
            && !BUILTIN_KEYWORDS.contains(&name)
            && !block_params.contains(&name)
    };

    for caps in mustache_re.captures_iter(&masked) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let inner_text = inner.as_str();
        let head_kind = if modifiers.binary_search(&whole.start()).is_ok() {
            NameKind::Modifier
        } else {
            NameKind::Either
        };

        if let Some(head) = head_re.captures(inner_text) {
            if let Some(h) = head.get(1) {
                let name = h.as_str();
                if name == "component" {
                    if let Some(literal) = head.get(2) {
                        if is_module_name(literal.as_str()) {
                            refs.push(NameRef {
                                name: literal.as_str().to_string(),
                                path: literal.as_str().to_string(),
                                kind: NameKind::Component,
                                offset: inner.start() + literal.start(),
                            });
                        }
                    }
                } else if is_module_name(name) {
                    refs.push(NameRef {
                        name: name.to_string(),
                        path: name.to_string(),
                        kind: head_kind,
                        offset: inner.start() + h.start(),
                    });
                }
            }
        }

        let unquoted = blank_strings(inner_text);
        for sub in subexpr_re.captures_iter(&unquoted) {
            let Some(m) = sub.get(1) else { continue };
            if is_module_name(m.as_str()) {
                refs.push(NameRef {
                    name: m.as_str().to_string(),
                    path: m.as_str().to_string(),
                    kind: NameKind::Helper,
                    offset: inner.start() + m.start(),
                });
            }
        }
    }

    refs.sort_by_key(|r| r.offset);
    Ok(refs)
}

/// Offsets of the `{{` of every mustache standing in attribute position
/// inside an open tag. Attribute values (`class={{x}}`, `title="{{x}}"`) are
/// not modifiers.
fn modifier_positions(source: &str) -> Vec<usize> {
    let bytes = source.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if is_mustache_start(bytes, i) {
            i = mustache_end(source, i);
        } else if bytes[i] == b'<' && bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) {
            i = scan_open_tag(source, i + 1, &mut found);
        } else {
            i += 1;
        }
    }
    found
}

fn is_mustache_start(bytes: &[u8], i: usize) -> bool {
    bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{')
}

fn mustache_end(source: &str, start: usize) -> usize {
    source[start + 2..]
        .find("}}")
        .map_or(source.len(), |end| start + 2 + end + 2)
}

/// Walk an open tag from just after `<`, returning the offset past its `>`
fn scan_open_tag(source: &str, mut i: usize, found: &mut Vec<usize>) -> usize {
    let bytes = source.as_bytes();
    let mut quote: Option<u8> = None;
    let mut after_eq = false;
    while i < bytes.len() {
        if is_mustache_start(bytes, i) {
            if quote.is_none() && !after_eq {
                found.push(i);
            }
            after_eq = false;
            i = mustache_end(source, i);
            continue;
        }
        let b = bytes[i];
        match quote {
            Some(q) if b == q => {
                quote = None;
                after_eq = false;
            }
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => return i + 1,
                b'=' => after_eq = true,
                c if c.is_ascii_whitespace() => {}
                _ => after_eq = false,
            },
        }
        i += 1;
    }
    i
}

/// Replace quoted string literals with spaces, keeping byte offsets
fn blank_strings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push_str(&" ".repeat(c.len_utf8()));
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                out.push(' ');
            }
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(source: &str) -> anyhow::Result<Vec<(String, String, NameKind)>> {
        Ok(scan_template(source)?
            .into_iter()
            .map(|r| (r.name, r.path, r.kind))
            .collect())
    }

    #[test]
    fn test_angle_bracket_invocations() -> anyhow::Result<()> {
        let found = names("<UserCard @user={{this.user}} />\n<Ui::TextInput></Ui::TextInput>")?;
        assert_eq!(
            found,
            vec![
                ("UserCard".into(), "user-card".into(), NameKind::Component),
                ("Ui::TextInput".into(), "ui/text-input".into(), NameKind::Component),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_mustache_and_subexpression_heads() -> anyhow::Result<()> {
        let found = names(r#"{{#fancy-list items=(sort-by "name" this.items) as |item|}}{{item}}{{/fancy-list}}"#)?;
        assert_eq!(
            found,
            vec![
                ("fancy-list".into(), "fancy-list".into(), NameKind::Either),
                ("sort-by".into(), "sort-by".into(), NameKind::Helper),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_skips_builtins_block_params_and_comments() -> anyhow::Result<()> {
        let source = r#"{{!-- <Ignored /> {{also-ignored}} --}}
<Input @value={{this.v}} />
<LinkTo @route="index">home</LinkTo>
{{#each-in this.map as |key value|}}{{key}}{{/each-in}}
<Form as |F|><F.Field /><F /></Form>
{{#if this.ok}}{{yield}}{{/if}}
<div class="a-b">{{@title}}</div>"#;
        let found = names(source)?;
        assert_eq!(found, vec![("Form".into(), "form".into(), NameKind::Component)]);
        Ok(())
    }

    #[test]
    fn test_component_helper_with_literal_name() -> anyhow::Result<()> {
        let found = names(r#"{{component "date-picker" value=this.date}}"#)?;
        assert_eq!(
            found,
            vec![("date-picker".into(), "date-picker".into(), NameKind::Component)]
        );
        Ok(())
    }

    #[test]
    fn test_offsets_point_at_names() -> anyhow::Result<()> {
        let source = "<p>{{format-date this.d}}</p><Widget />";
        for r in scan_template(source)? {
            assert_eq!(&source[r.offset..r.offset + r.name.len()], r.name);
        }
        Ok(())
    }

    #[test]
    fn test_mustaches_in_open_tags_are_modifiers() -> anyhow::Result<()> {
        let source = r#"<input {{auto-focus}} class={{class-names "a"}} title="{{page-title}}" />
<div {{did-insert this.setup}}>{{fancy-list}}</div>"#;
        let found = names(source)?;
        assert_eq!(
            found,
            vec![
                ("auto-focus".into(), "auto-focus".into(), NameKind::Modifier),
                ("class-names".into(), "class-names".into(), NameKind::Either),
                ("page-title".into(), "page-title".into(), NameKind::Either),
                ("did-insert".into(), "did-insert".into(), NameKind::Modifier),
                ("fancy-list".into(), "fancy-list".into(), NameKind::Either),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_block_params_shadow_mustache_and_subexpression_heads() -> anyhow::Result<()> {
        let source = "{{#each @items as |list-item format-row|}}{{list-item}}{{concat (format-row list-item)}}{{/each}}";
        assert!(names(source)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_string_literals_hide_subexpressions() -> anyhow::Result<()> {
        let found = names(r#"{{concat "see (foot-note)" 'and (side-bar)' (to-upper @x)}}"#)?;
        assert_eq!(
            found,
            vec![("to-upper".into(), "to-upper".into(), NameKind::Helper)]
        );
        Ok(())
    }
}
