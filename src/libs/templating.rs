//! # Descriptor Templating
//!
//! Descriptor fields such as
//! `https://example.com/{{ .Name }}-{{ .Version | trimPrefix "v" }}.tar.gz` are Go
//! text/template strings, rendered with `gtmpl`. Besides the engine builtins (`eq`, `ne`,
//! `not`, `and`, `or`, `len`, `index`, `printf`, ...) templates can call `lower`,
//! `upper`, `trimPrefix`, `trimSuffix`, `replace`, `contains`, `hasPrefix`, `hasSuffix`
//! and `default`.
//!
//! Fields are rendered in three passes (see [`Pass`]) because some values only exist
//! once the populator has run: `.Version` after the version lookup, `.URL`, `.File`
//! and `.Base` once the asset URL is known, and the source metadata under `.Source`
//! as the populator learns it.

use std::collections::{BTreeMap, HashMap};
use std::env;

use gtmpl::{Func, FuncError, Template, Value};
use thiserror::Error;

use crate::libs::errors::{Error, Result};
use crate::schemas::tools::Tool;

/// Failure to parse or execute a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template text is malformed or calls an unknown function.
    #[error("parse error: {0}")]
    Parse(String),
    /// Rendering failed: unknown field, bad function arguments.
    #[error("render error: {0}")]
    Render(String),
}

type TemplateResult<T> = std::result::Result<T, TemplateError>;

const FUNCTIONS: [(&str, Func); 9] = [
    ("lower", lower),
    ("upper", upper),
    ("trimPrefix", trim_prefix),
    ("trimSuffix", trim_suffix),
    ("replace", replace),
    ("contains", contains),
    ("hasPrefix", has_prefix),
    ("hasSuffix", has_suffix),
    ("default", default),
];

// ============================================================================
// CONTEXT
// ============================================================================

/// The data a template is rendered against.
#[derive(Clone)]
pub struct Context {
    root: Value,
}

impl Context {
    /// Builds the context for a tool descriptor.
    ///
    /// Keys: `Name`, `Output`, `Version`, `URL`, `File`, `Base`, `Exe.Name`,
    /// `Platform.{OS,Arch,Libc,Distribution,Extension}`, `Source.Type` plus whatever
    /// `source` metadata the populator reported (`Source.Repo`, `Source.Tag`, ...),
    /// `Values.*` and `Env.*` (process environment overlaid with the descriptor's
    /// `env`).
    ///
    /// Fixed fields also answer to their lowercase spelling (`.platform.os`); a field
    /// that does not exist is a render error. `Values` and `Env` are plain maps where a
    /// missing key renders as `<no value>` and is false in conditions.
    #[must_use]
    pub fn for_tool(tool: &Tool, source: &BTreeMap<String, String>) -> Self {
        let file = file_name_of(&tool.url);
        let base = strip_archive_extension(&file);

        let mut env_map: HashMap<String, Value> =
            env::vars().map(|(key, value)| (key, Value::from(value))).collect();
        for (key, value) in &tool.env {
            env_map.insert(key.clone(), Value::from(value.clone()));
        }

        let values: HashMap<String, Value> = tool
            .values
            .iter()
            .map(|(key, value)| (key.clone(), from_yaml(value)))
            .collect();

        let exe_name = if tool.exe.name.is_empty() {
            tool.name.clone()
        } else {
            tool.exe.name.clone()
        };

        let mut source_fields = vec![("Type".to_string(), text_value(&tool.source.kind))];
        source_fields.extend(
            source
                .iter()
                .filter(|(key, _)| key.as_str() != "Type")
                .map(|(key, value)| (key.clone(), text_value(value))),
        );

        let root = object(vec![
            ("Name".into(), text_value(&tool.name)),
            ("Output".into(), text_value(&tool.output)),
            ("Version".into(), text_value(&tool.version.version)),
            ("URL".into(), text_value(&tool.url)),
            ("File".into(), Value::from(file)),
            ("Base".into(), Value::from(base)),
            ("Exe".into(), object(vec![("Name".into(), Value::from(exe_name))])),
            (
                "Platform".into(),
                object(vec![
                    ("OS".into(), text_value(&tool.platform.os)),
                    ("Arch".into(), text_value(&tool.platform.arch)),
                    ("Libc".into(), text_value(&tool.platform.libc)),
                    ("Distribution".into(), text_value(&tool.platform.distribution)),
                    ("Extension".into(), text_value(&tool.platform.extension)),
                ]),
            ),
            ("Source".into(), object(source_fields)),
            ("Values".into(), Value::Map(values)),
            ("Env".into(), Value::Map(env_map)),
        ]);
        Self { root }
    }

    /// Renders a template. Text without `{{` is returned unchanged.
    pub fn render(&self, template: &str) -> TemplateResult<String> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }
        let mut engine = Template::default();
        for (name, func) in FUNCTIONS {
            engine.add_func(name, func);
        }
        engine
            .parse(template)
            .map_err(|e| TemplateError::Parse(e.to_string()))?;
        engine
            .render(&gtmpl::Context::from(self.root.clone()))
            .map_err(|e| TemplateError::Render(e.to_string()))
    }
}

// Struct-like value: unknown fields are errors. Every key is also reachable in
// lowercase.
fn object(fields: Vec<(String, Value)>) -> Value {
    let mut map = HashMap::with_capacity(fields.len() * 2);
    for (key, value) in fields {
        let lower = key.to_lowercase();
        if lower != key {
            map.insert(lower, value.clone());
        }
        map.insert(key, value);
    }
    Value::Object(map)
}

fn text_value(text: &str) -> Value {
    Value::from(text.to_string())
}

fn from_yaml(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Nil,
        serde_yaml::Value::Bool(b) => Value::from(*b),
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .map(Value::from)
            .or_else(|| n.as_u64().map(Value::from))
            .or_else(|| n.as_f64().map(Value::from))
            .unwrap_or(Value::Nil),
        serde_yaml::Value::String(s) => Value::from(s.clone()),
        serde_yaml::Value::Sequence(items) => Value::Array(items.iter().map(from_yaml).collect()),
        serde_yaml::Value::Mapping(map) => Value::Map(
            map.iter()
                .filter_map(|(key, value)| key.as_str().map(|k| (k.to_string(), from_yaml(value))))
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => from_yaml(&tagged.value),
    }
}

/// Last path segment of a URL, without query or fragment.
#[must_use]
pub fn file_name_of(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// File name with a known archive extension removed.
#[must_use]
pub fn strip_archive_extension(file: &str) -> String {
    const EXTENSIONS: [&str; 11] = [
        ".tar.gz", ".tar.xz", ".tar.bz2", ".tgz", ".txz", ".tbz2", ".tbz", ".zip", ".tar", ".gz",
        ".exe",
    ];
    let lower = file.to_lowercase();
    for ext in EXTENSIONS {
        if lower.ends_with(ext) {
            return file[..file.len() - ext.len()].to_string();
        }
    }
    file.to_string()
}

// ============================================================================
// FUNCTIONS
// ============================================================================

// Missing map keys and nil render as the empty string in function arguments.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::NoValue | Value::Nil => String::new(),
        other => other.to_string(),
    }
}

fn string_args<const N: usize>(name: &str, args: &[Value]) -> std::result::Result<[String; N], FuncError> {
    if args.len() != N {
        return Err(FuncError::ExactlyXArgs(name.to_string(), N));
    }
    Ok(std::array::from_fn(|i| text(&args[i])))
}

fn lower(args: &[Value]) -> std::result::Result<Value, FuncError> {
    let [s] = string_args::<1>("lower", args)?;
    Ok(Value::from(s.to_lowercase()))
}

fn upper(args: &[Value]) -> std::result::Result<Value, FuncError> {
    let [s] = string_args::<1>("upper", args)?;
    Ok(Value::from(s.to_uppercase()))
}

fn trim_prefix(args: &[Value]) -> std::result::Result<Value, FuncError> {
    let [prefix, s] = string_args::<2>("trimPrefix", args)?;
    Ok(Value::from(s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_string()))
}

fn trim_suffix(args: &[Value]) -> std::result::Result<Value, FuncError> {
    let [suffix, s] = string_args::<2>("trimSuffix", args)?;
    Ok(Value::from(s.strip_suffix(suffix.as_str()).unwrap_or(&s).to_string()))
}

fn replace(args: &[Value]) -> std::result::Result<Value, FuncError> {
    let [old, new, s] = string_args::<3>("replace", args)?;
    Ok(Value::from(s.replace(old.as_str(), &new)))
}

fn contains(args: &[Value]) -> std::result::Result<Value, FuncError> {
    let [needle, s] = string_args::<2>("contains", args)?;
    Ok(Value::from(s.contains(needle.as_str())))
}

fn has_prefix(args: &[Value]) -> std::result::Result<Value, FuncError> {
    let [prefix, s] = string_args::<2>("hasPrefix", args)?;
    Ok(Value::from(s.starts_with(prefix.as_str())))
}

fn has_suffix(args: &[Value]) -> std::result::Result<Value, FuncError> {
    let [suffix, s] = string_args::<2>("hasSuffix", args)?;
    Ok(Value::from(s.ends_with(suffix.as_str())))
}

// `default "x" .Value`: the fallback when the value is missing or empty.
fn default(args: &[Value]) -> std::result::Result<Value, FuncError> {
    if args.len() != 2 {
        return Err(FuncError::ExactlyXArgs("default".to_string(), 2));
    }
    if text(&args[1]).is_empty() {
        Ok(args[0].clone())
    } else {
        Ok(args[1].clone())
    }
}

// ============================================================================
// DESCRIPTOR PASSES
// ============================================================================

/// Which group of descriptor fields to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Fields known before any API call: name, source type, output, tokens,
    /// checksum type, skip conditions and the repository or package a version is
    /// looked up for.
    Pre,
    /// Fields that may use `.Version`.
    Post,
    /// Fields that may use `.URL`, `.File` and `.Base`.
    PostUrl,
}

/// Renders the fields belonging to `pass` in place.
///
/// The context is built once from the descriptor as it is before the pass, with
/// `source` exposed under `.Source`.
pub fn apply(tool: &mut Tool, pass: Pass, source: &BTreeMap<String, String>) -> Result<()> {
    let context = Context::for_tool(tool, source);
    let render = |field: &str, value: &mut String| -> Result<()> {
        let rendered = context.render(value).map_err(|source| Error::Template {
            field: field.to_string(),
            source,
        })?;
        *value = rendered;
        Ok(())
    };
    let render_all = |field: &str, values: &mut Vec<String>| -> Result<()> {
        for value in values.iter_mut() {
            render(field, value)?;
        }
        Ok(())
    };

    match pass {
        Pass::Pre => {
            render("name", &mut tool.name)?;
            render("source.type", &mut tool.source.kind)?;
            render("output", &mut tool.output)?;
            render("source.github.token", &mut tool.source.github.token)?;
            render("source.gitlab.token", &mut tool.source.gitlab.token)?;
            render("source.url.token", &mut tool.source.url.token)?;
            render("checksum.type", &mut tool.checksum.kind)?;
            render("source.github.repo", &mut tool.source.github.repo)?;
            render("source.gitlab.project", &mut tool.source.gitlab.project)?;
            render("source.go.package", &mut tool.source.go.package)?;
            render("source.go.module", &mut tool.source.go.module)?;
            for skip in &mut tool.skip {
                render("skip.condition", &mut skip.condition)?;
            }
        }
        Pass::Post => {
            render("url", &mut tool.url)?;
            render("source.url.url", &mut tool.source.url.url)?;
            for value in tool.source.url.headers.values_mut() {
                render("source.url.headers", value)?;
            }
            render_all("source.command.commands", &mut tool.source.command.commands)?;
            render("exe.name", &mut tool.exe.name)?;
            render_all("exe.patterns", &mut tool.exe.patterns)?;
            render_all("aliases", &mut tool.aliases)?;
            for hint in &mut tool.hints {
                render("hints.pattern", &mut hint.pattern)?;
            }
            render_all("commands", &mut tool.commands)?;
            render_all("version.commands", &mut tool.version.commands)?;
            render_all("version.patterns", &mut tool.version.patterns)?;
            render("checksum.pattern", &mut tool.checksum.pattern)?;
            render_all("extensions", &mut tool.extensions)?;
        }
        Pass::PostUrl => {
            render("checksum.value", &mut tool.checksum.value)?;
            render("checksum.entry", &mut tool.checksum.entry)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        let mut tool: Tool = serde_yaml::from_str(
            r#"
name: gh
version: v2.40.0
values: {flavor: full}
env: {HOME: /home/me}
"#,
        )
        .unwrap();
        tool.platform.os = "linux".into();
        tool.platform.arch = "amd64".into();
        tool.platform.libc = "musl".into();
        Context::for_tool(&tool, &BTreeMap::new())
    }

    #[test]
    fn renders_fields_and_pipes() {
        let out = ctx()
            .render(r#"https://x/{{ .Name }}_{{ .Version | trimPrefix "v" }}_{{ .Platform.OS }}.tar.gz"#)
            .unwrap();
        assert_eq!(out, "https://x/gh_2.40.0_linux.tar.gz");
    }

    #[test]
    fn fixed_fields_answer_to_lowercase() {
        assert_eq!(ctx().render("{{ .platform.arch }}").unwrap(), "amd64");
        assert_eq!(ctx().render("{{ .exe.name }}").unwrap(), "gh");
    }

    #[test]
    fn unknown_field_is_an_error() {
        assert!(matches!(ctx().render("{{ .Nope }}"), Err(TemplateError::Render(_))));
    }

    #[test]
    fn missing_values_fall_back() {
        let c = ctx();
        assert_eq!(
            c.render(r#"{{ .Values.missing | default "x" }}"#).unwrap(),
            "x"
        );
        assert_eq!(c.render(r#"{{ .Values.flavor | default "x" }}"#).unwrap(), "full");
        assert_eq!(
            c.render("{{ if .Values.missing }}set{{ else }}unset{{ end }}").unwrap(),
            "unset"
        );
        assert_eq!(c.render("{{ .Env.HOME }}").unwrap(), "/home/me");
    }

    #[test]
    fn conditions_render_booleans() {
        let c = ctx();
        assert_eq!(c.render(r#"{{ ne .Platform.Libc "glibc" }}"#).unwrap(), "true");
        assert_eq!(c.render(r#"{{ eq .Platform.OS "windows" }}"#).unwrap(), "false");
        assert_eq!(
            c.render(r#"{{ and (eq .Platform.OS "linux") (not (eq .Platform.Arch "arm64")) }}"#)
                .unwrap(),
            "true"
        );
        assert_eq!(c.render(r#"{{ or false (hasPrefix "v" .Version) }}"#).unwrap(), "true");
    }

    #[test]
    fn if_else_with_trim_markers() {
        let c = ctx();
        let t = "{{- if eq .Platform.OS \"windows\" -}} zip {{- else -}} tar {{- end -}}";
        assert_eq!(c.render(t).unwrap(), "tar");
        assert_eq!(
            c.render("a {{ if .Values.flavor }}b{{ end }} c").unwrap(),
            "a b c"
        );
    }

    #[test]
    fn string_functions() {
        let c = ctx();
        assert_eq!(c.render(r#"{{ replace "." "_" .Version }}"#).unwrap(), "v2_40_0");
        assert_eq!(c.render("{{ upper .Name }}").unwrap(), "GH");
        assert_eq!(c.render(r#"{{ "ABC" | lower }}"#).unwrap(), "abc");
        assert_eq!(c.render(r#"{{ trimSuffix ".0" .Version }}"#).unwrap(), "v2.40");
        assert_eq!(c.render(r#"{{ contains "40" .Version }}"#).unwrap(), "true");
        assert_eq!(c.render(r#"{{ hasSuffix ".0" .Version }}"#).unwrap(), "true");
    }

    #[test]
    fn malformed_templates_fail_to_parse() {
        assert!(matches!(ctx().render("{{ .Name "), Err(TemplateError::Parse(_))));
        assert!(matches!(
            ctx().render("{{ if .Name }}x"),
            Err(TemplateError::Parse(_))
        ));
        assert!(matches!(
            ctx().render("{{ bogus .Name }}"),
            Err(TemplateError::Parse(_))
        ));
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(ctx().render(r"\d+\.\d+").unwrap(), r"\d+\.\d+");
    }

    #[test]
    fn passes_render_their_fields() {
        let mut tool: Tool = serde_yaml::from_str(
            r#"
name: tool
version: v1.2.3
output: "/opt/{{ .Name }}"
url: "https://example.com/{{ .Name }}-{{ .Version }}.tar.gz"
checksum:
  type: sha256
  value: "url:https://example.com/{{ .File }}.sha256"
skip:
  - '{{ eq .Name "tool" }}'
"#,
        )
        .unwrap();
        let none = BTreeMap::new();

        apply(&mut tool, Pass::Pre, &none).unwrap();
        assert_eq!(tool.output, "/opt/tool");
        assert_eq!(tool.skip[0].condition, "true");
        assert!(tool.url.contains("{{"));

        apply(&mut tool, Pass::Post, &none).unwrap();
        assert_eq!(tool.url, "https://example.com/tool-v1.2.3.tar.gz");

        apply(&mut tool, Pass::PostUrl, &none).unwrap();
        assert_eq!(
            tool.checksum.value,
            "url:https://example.com/tool-v1.2.3.tar.gz.sha256"
        );
    }

    #[test]
    fn source_metadata_is_exposed() {
        let mut tool: Tool = serde_yaml::from_str(
            r#"
name: tool
source: {type: github}
url: "https://mirror.example.com/{{ .Source.Repo }}/{{ .Source.Tag }}/{{ .Source.Type }}"
"#,
        )
        .unwrap();
        let source = BTreeMap::from([
            ("Repo".to_string(), "owner/tool".to_string()),
            ("Tag".to_string(), "v1.0.0".to_string()),
        ]);
        apply(&mut tool, Pass::Post, &source).unwrap();
        assert_eq!(tool.url, "https://mirror.example.com/owner/tool/v1.0.0/github");
    }

    #[test]
    fn file_and_base_from_url() {
        assert_eq!(file_name_of("https://h/a/b/t-1.0.tar.gz?x=1"), "t-1.0.tar.gz");
        assert_eq!(strip_archive_extension("t-1.0.tar.gz"), "t-1.0");
        assert_eq!(strip_archive_extension("t.ZIP"), "t");
    }

    #[test]
    fn template_errors_name_the_field() {
        let mut tool: Tool = serde_yaml::from_str("{name: t, output: '{{ .Missing }}'}").unwrap();
        let err = apply(&mut tool, Pass::Pre, &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("output"), "{err}");
    }
}
