//! Field-wise merging of descriptors.
//!
//! A field is "set" when it is non-empty (strings, lists, maps) or `Some` (options).
//! [`Merge::fill_from`] copies only unset fields, cloning collections so two
//! descriptors never share data. The two public compositions are built on it:
//!
//! - [`Merge::merge_into`]: `p0 <- p1 <- ... <- self`. `self` wins over every parent
//!   and earlier parents win over later ones. Used for default inheritance.
//! - [`Merge::merge_from`]: `self <- o0 <- o1 <- ...`. Later values win. Used for
//!   forced overrides.

use std::collections::BTreeMap;

use crate::schemas::platform::Platform;
use crate::schemas::tools::{
    Checksum, CommandSource, Exe, GitHubSource, GitLabSource, GoSource, Source, Tool, UrlSource,
    Version,
};

/// Field-wise precedence merge.
pub trait Merge: Clone {
    /// Copies every field of `other` that is unset in `self`.
    fn fill_from(&mut self, other: &Self);

    /// Returns `self` completed from `parents`, earlier parents taking precedence.
    #[must_use]
    fn merge_into(&self, parents: &[&Self]) -> Self {
        let mut merged = self.clone();
        for parent in parents {
            merged.fill_from(parent);
        }
        merged
    }

    /// Returns `self` overridden by `others`, later entries taking precedence.
    #[must_use]
    fn merge_from(&self, others: &[&Self]) -> Self {
        let mut merged = self.clone();
        for other in others {
            let mut next = (*other).clone();
            next.fill_from(&merged);
            merged = next;
        }
        merged
    }
}

fn fill_string(target: &mut String, source: &str) {
    if target.is_empty() && !source.is_empty() {
        *target = source.to_string();
    }
}

fn fill_vec<T: Clone>(target: &mut Vec<T>, source: &[T]) {
    if target.is_empty() && !source.is_empty() {
        *target = source.to_vec();
    }
}

fn fill_option<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if target.is_none() {
        target.clone_from(source);
    }
}

fn fill_map<V: Clone>(target: &mut BTreeMap<String, V>, source: &BTreeMap<String, V>) {
    for (key, value) in source {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

impl Merge for Platform {
    fn fill_from(&mut self, other: &Self) {
        self.merge(other);
    }
}

impl Merge for Version {
    fn fill_from(&mut self, other: &Self) {
        fill_string(&mut self.version, &other.version);
        fill_vec(&mut self.commands, &other.commands);
        fill_vec(&mut self.patterns, &other.patterns);
    }
}

impl Merge for Exe {
    fn fill_from(&mut self, other: &Self) {
        fill_string(&mut self.name, &other.name);
        fill_vec(&mut self.patterns, &other.patterns);
    }
}

impl Merge for Checksum {
    fn fill_from(&mut self, other: &Self) {
        fill_string(&mut self.kind, &other.kind);
        fill_string(&mut self.value, &other.value);
        fill_string(&mut self.pattern, &other.pattern);
        fill_string(&mut self.entry, &other.entry);
    }
}

impl Merge for GitHubSource {
    fn fill_from(&mut self, other: &Self) {
        fill_string(&mut self.repo, &other.repo);
        fill_string(&mut self.token, &other.token);
        fill_option(&mut self.pre, &other.pre);
        fill_string(&mut self.api, &other.api);
    }
}

impl Merge for GitLabSource {
    fn fill_from(&mut self, other: &Self) {
        fill_string(&mut self.project, &other.project);
        fill_string(&mut self.token, &other.token);
        fill_string(&mut self.server, &other.server);
        fill_option(&mut self.pre, &other.pre);
    }
}

impl Merge for UrlSource {
    fn fill_from(&mut self, other: &Self) {
        fill_string(&mut self.url, &other.url);
        fill_string(&mut self.token, &other.token);
        fill_map(&mut self.headers, &other.headers);
    }
}

impl Merge for GoSource {
    fn fill_from(&mut self, other: &Self) {
        fill_string(&mut self.package, &other.package);
        fill_string(&mut self.module, &other.module);
        fill_string(&mut self.command, &other.command);
    }
}

impl Merge for CommandSource {
    fn fill_from(&mut self, other: &Self) {
        fill_vec(&mut self.commands, &other.commands);
    }
}

impl Merge for Source {
    fn fill_from(&mut self, other: &Self) {
        fill_string(&mut self.kind, &other.kind);
        self.github.fill_from(&other.github);
        self.gitlab.fill_from(&other.gitlab);
        self.url.fill_from(&other.url);
        self.go.fill_from(&other.go);
        self.command.fill_from(&other.command);
    }
}

impl Merge for Tool {
    fn fill_from(&mut self, other: &Self) {
        fill_string(&mut self.name, &other.name);
        fill_string(&mut self.description, &other.description);
        self.version.fill_from(&other.version);
        fill_string(&mut self.url, &other.url);
        fill_string(&mut self.output, &other.output);
        self.exe.fill_from(&other.exe);
        self.platform.fill_from(&other.platform);
        fill_vec(&mut self.aliases, &other.aliases);
        fill_map(&mut self.values, &other.values);
        fill_vec(&mut self.fallbacks, &other.fallbacks);
        fill_vec(&mut self.hints, &other.hints);
        self.source.fill_from(&other.source);
        fill_vec(&mut self.commands, &other.commands);
        fill_vec(&mut self.tags, &other.tags);
        fill_option(&mut self.strategy, &other.strategy);
        fill_vec(&mut self.extensions, &other.extensions);
        fill_vec(&mut self.skip, &other.skip);
        fill_option(&mut self.mode, &other.mode);
        fill_map(&mut self.env, &other.env);
        self.checksum.fill_from(&other.checksum);
        fill_option(&mut self.no_verify_ssl, &other.no_verify_ssl);
        fill_option(&mut self.no_cache, &other.no_cache);
        // `inherit` describes the node itself and is never taken from a parent.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::tools::Strategy;

    fn tool(yaml: &str) -> Tool {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn merge_into_prefers_self_then_earlier_parents() {
        let child = tool("{name: gh, output: /child}");
        let first = tool("{output: /first, strategy: sync, description: first}");
        let second = tool("{output: /second, strategy: force, description: second, mode: extract}");

        let merged = child.merge_into(&[&first, &second]);
        assert_eq!(merged.name, "gh");
        assert_eq!(merged.output, "/child");
        assert_eq!(merged.strategy, Some(Strategy::Sync));
        assert_eq!(merged.description, "first");
        assert_eq!(merged.mode, Some(crate::schemas::tools::Mode::Extract));
    }

    #[test]
    fn merge_from_prefers_later_others() {
        let base = tool("{name: gh, output: /base, strategy: sync}");
        let o1 = tool("{strategy: force}");
        let o2 = tool("{strategy: upgrade, output: /forced}");
        let merged = base.merge_from(&[&o1, &o2]);
        assert_eq!(merged.strategy, Some(Strategy::Upgrade));
        assert_eq!(merged.output, "/forced");
        assert_eq!(merged.name, "gh");
    }

    #[test]
    fn merge_is_idempotent() {
        let d = tool(
            "{name: gh, output: /opt/bin, tags: [cli], env: {A: b}, hints: [{pattern: gnu}], source: {type: github, github: {repo: cli/cli}}}",
        );
        assert_eq!(d.merge_into(&[&d]), d);
        assert_eq!(d.merge_from(&[&d]), d);
    }

    #[test]
    fn collections_are_copied_not_shared() {
        let parent = tool("{aliases: [a, b], env: {X: '1'}}");
        let mut merged = Tool::default().merge_into(&[&parent]);
        merged.aliases.push("c".into());
        merged.env.insert("Y".into(), "2".into());
        assert_eq!(parent.aliases, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(parent.env.len(), 1);
    }

    #[test]
    fn maps_merge_key_wise() {
        let child = tool("{env: {A: child}}");
        let parent = tool("{env: {A: parent, B: parent}}");
        let merged = child.merge_into(&[&parent]);
        assert_eq!(merged.env["A"], "child");
        assert_eq!(merged.env["B"], "parent");
    }
}
