//! Vue single-file component scanner.
//!
//! The SFC blocks are located with regular expressions; `<script>` blocks go
//! through the TypeScript walker and the `<template>` block is scanned for
//! component tags and bound identifiers.

use super::typescript::{grammar_for, scan_script};
use super::*;
use regex::Regex;
use std::sync::LazyLock;

static SCRIPT_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<script\b([^>]*)>").expect("valid script open regex"));

static LANG_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\blang\s*=\s*["']([A-Za-z]+)["']"#).expect("valid lang regex"));

static TEMPLATE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*<template\b[^>]*>").expect("valid template regex"));

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z][A-Za-z0-9_.-]*)").expect("valid tag regex"));

/// `@click="save"`, `v-on:submit="send"`, `:items="list"`, `v-if="ready"`
static BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:@|v-on:|v-bind:|:|v-(?:if|else-if|show|model|for|html|text)\b[^=\s]*)[A-Za-z0-9_.\-\[\]]*\s*=\s*"([^"]*)""#)
        .expect("valid binding regex")
});

static INTERPOLATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid interpolation regex"));

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").expect("valid identifier regex"));

/// Framework-provided tags that never name a project component.
const BUILTIN_TAGS: &[&str] = &[
    "template", "slot", "component", "transition", "transition-group", "keep-alive",
    "teleport", "suspense", "router-view", "router-link", "RouterView", "RouterLink",
    "Transition", "TransitionGroup", "KeepAlive", "Teleport", "Suspense",
];

const EXPRESSION_KEYWORDS: &[&str] = &[
    "true", "false", "null", "undefined", "in", "of", "typeof", "instanceof", "new", "this",
    "$event", "$emit", "$refs", "$slots", "$attrs", "$props", "$route", "$router", "$t",
];

/// Vue SFC scanner.
pub struct VueScanner;

impl VueScanner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VueScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageScanner for VueScanner {
    fn name(&self) -> &'static str {
        "vue"
    }

    fn extensions(&self) -> &[&'static str] {
        &["vue"]
    }

    fn scan(&self, file: &SourceFile) -> Result<FileFragment, ParseFailure> {
        let text = &file.text;
        let mut builder = FragmentBuilder::new(&file.path, Language::Vue, text);
        let line_count = text.lines().count().max(1);
        let component = builder.push(
            LocalSymbol::new(component_name(&file.path), SymbolKind::Component, LineRange::new(1, line_count))
                .exported(true),
        );

        for block in script_blocks(text, &file.path)? {
            builder.set_line_offset(block.line_offset);
            scan_script(&mut builder, block.body, grammar_for(&block.lang), &component).map_err(
                |mut failure| {
                    failure.line = failure.line.map(|l| l + block.line_offset);
                    failure
                },
            )?;
        }
        builder.set_line_offset(0);

        if let Some((body, offset)) = template_block(text, &file.path)? {
            scan_template(&mut builder, &component, body, offset);
        }

        builder.propagate_exports();
        Ok(builder.finish())
    }
}

/// PascalCase component name from the file stem (`user-card.vue` -> `UserCard`).
pub fn component_name(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("Component");
    stem.split(['-', '_', '.'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

struct ScriptBlock<'a> {
    body: &'a str,
    lang: String,
    /// Lines preceding the body
    line_offset: usize,
}

fn line_at(text: &str, byte: usize) -> usize {
    text[..byte].bytes().filter(|&b| b == b'\n').count()
}

fn script_blocks<'a>(text: &'a str, path: &Path) -> Result<Vec<ScriptBlock<'a>>, ParseFailure> {
    let mut blocks = Vec::new();
    let mut pos = 0;
    while let Some(open) = SCRIPT_OPEN.captures_at(text, pos) {
        let (Some(whole), Some(attrs)) = (open.get(0), open.get(1)) else {
            break;
        };
        let start = whole.end();
        let Some(close) = text[start..].find("</script>") else {
            return Err(ParseFailure::new(path, "unterminated <script> block")
                .at_line(line_at(text, whole.start()) + 1));
        };
        let lang = LANG_ATTR
            .captures(attrs.as_str())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_else(|| "js".to_string());
        blocks.push(ScriptBlock {
            body: &text[start..start + close],
            lang,
            line_offset: line_at(text, start),
        });
        pos = start + close + "</script>".len();
    }
    Ok(blocks)
}

/// Body of the top-level `<template>` block and its line offset.
fn template_block<'a>(text: &'a str, path: &Path) -> Result<Option<(&'a str, usize)>, ParseFailure> {
    let Some(open) = TEMPLATE_OPEN.find(text) else {
        return Ok(None);
    };
    // Templates nest, so the outer block ends at the last closing tag
    let Some(close) = text.rfind("</template>").filter(|&c| c >= open.end()) else {
        return Err(ParseFailure::new(path, "unterminated <template> block")
            .at_line(line_at(text, open.start()) + 1));
    };
    Ok(Some((&text[open.end()..close], line_at(text, open.end()))))
}

fn is_component_tag(tag: &str) -> bool {
    !BUILTIN_TAGS.contains(&tag) && (is_capitalized(tag) || tag.contains('-'))
}

fn scan_template(builder: &mut FragmentBuilder, component: &str, body: &str, offset: usize) {
    for caps in TAG.captures_iter(body) {
        let Some(tag) = caps.get(1) else { continue };
        if is_component_tag(tag.as_str()) {
            let line = offset + line_at(body, tag.start()) + 1;
            builder.edge(
                component,
                TargetDescriptor::template(tag.as_str()),
                DependencyKind::TemplateReference,
                line,
            );
        }
    }

    let expressions = BINDING
        .captures_iter(body)
        .chain(INTERPOLATION.captures_iter(body))
        .filter_map(|c| c.get(1));
    for expr in expressions {
        let line = offset + line_at(body, expr.start()) + 1;
        for ident in template_identifiers(expr.as_str()) {
            builder.edge(
                component,
                TargetDescriptor::template(ident),
                DependencyKind::TemplateReference,
                line,
            );
        }
    }
}

/// Free identifiers of a template expression (`item.name` yields `item`).
fn template_identifiers(expr: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let bytes = expr.as_bytes();
    let mut in_string: Option<u8> = None;
    let mut string_spans = Vec::new();
    let mut span_start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match in_string {
            Some(q) if b == q => {
                string_spans.push((span_start, i));
                in_string = None;
            }
            Some(_) => {}
            None if b == b'\'' || b == b'`' => {
                in_string = Some(b);
                span_start = i;
            }
            None => {}
        }
    }

    for m in IDENT.find_iter(expr) {
        let start = m.start();
        if string_spans.iter().any(|&(s, e)| start > s && start < e) {
            continue;
        }
        if start > 0 && bytes[start - 1] == b'.' {
            continue;
        }
        if bytes.get(start).is_some_and(u8::is_ascii_digit) {
            continue;
        }
        let ident = m.as_str();
        if EXPRESSION_KEYWORDS.contains(&ident) || out.contains(&ident) {
            continue;
        }
        out.push(ident);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = r#"<template>
  <div class="card">
    <user-avatar :user="user" />
    <template v-if="ready">
      <BaseButton @click="save">{{ label }}</BaseButton>
    </template>
  </div>
</template>

<script setup lang="ts">
import { api } from "@/api";
const label = "Save";
function save() {
  api.post("/api/cards", {});
}
function unused() {}
</script>
"#;

    fn has_edge(fragment: &FileFragment, source: &str, target: &TargetDescriptor, kind: DependencyKind) -> bool {
        fragment
            .edges
            .iter()
            .any(|e| e.source == source && &e.reference == target && e.kind == kind)
    }

    #[test]
    fn test_component_name() {
        assert_eq!(component_name(Path::new("src/user-card.vue")), "UserCard");
        assert_eq!(component_name(Path::new("App.vue")), "App");
    }

    #[test]
    fn test_scan_sfc() {
        let fragment = VueScanner::new()
            .scan(&SourceFile::new("src/components/user-card.vue", CARD))
            .unwrap();
        assert_eq!(fragment.language, Language::Vue);

        let component = fragment.symbol("UserCard").unwrap();
        assert_eq!(component.kind, SymbolKind::Component);
        assert!(component.exported);

        // Script symbols keep their line in the whole file
        let save = fragment.symbol("save").unwrap();
        assert_eq!(save.lines.start, 13);
        assert!(!fragment.symbol("unused").unwrap().exported);

        let template = |name: &str| TargetDescriptor::template(name);
        assert!(has_edge(&fragment, "UserCard", &template("user-avatar"), DependencyKind::TemplateReference));
        assert!(has_edge(&fragment, "UserCard", &template("BaseButton"), DependencyKind::TemplateReference));
        assert!(has_edge(&fragment, "UserCard", &template("save"), DependencyKind::TemplateReference));
        assert!(has_edge(&fragment, "UserCard", &template("label"), DependencyKind::TemplateReference));
        assert!(has_edge(&fragment, "UserCard", &template("ready"), DependencyKind::TemplateReference));
        assert!(!has_edge(&fragment, "UserCard", &template("div"), DependencyKind::TemplateReference));

        assert!(has_edge(
            &fragment,
            "save",
            &TargetDescriptor::Route {
                method: Some("POST".into()),
                path: "/api/cards".into()
            },
            DependencyKind::RouteInvocation
        ));
        assert!(has_edge(&fragment, MODULE_KEY, &TargetDescriptor::module("@/api"), DependencyKind::Import));
    }

    #[test]
    fn test_template_identifiers() {
        assert_eq!(template_identifiers("item.name + count"), vec!["item", "count"]);
        assert_eq!(template_identifiers("open($event, 'x.y')"), vec!["open"]);
        assert_eq!(template_identifiers("ok ? 1 : 2"), vec!["ok"]);
    }

    #[test]
    fn test_unterminated_blocks_fail() {
        let err = VueScanner::new()
            .scan(&SourceFile::new("Broken.vue", "<template><div/></template>\n<script>\nconst a = 1;\n"))
            .unwrap_err();
        assert_eq!(err.line, Some(2));

        assert!(VueScanner::new()
            .scan(&SourceFile::new("Broken.vue", "<template>\n<div/>\n"))
            .is_err());
    }

    #[test]
    fn test_script_syntax_error_is_offset() {
        let source = "<template><p/></template>\n<script>\nfunction ( {\n</script>\n";
        let err = VueScanner::new()
            .scan(&SourceFile::new("Bad.vue", source))
            .unwrap_err();
        assert!(err.line.is_some_and(|l| l >= 3));
    }
}
