//! Bucket descriptors.
//!
//! A bucket is a key prefix (`base`) layered over one physical binding. The
//! root bucket owns the binding-name rule; child buckets extend the root's
//! prefix and inherit its rule, so a whole family shares one binding.
//!
//! ```text
//! bucket                  root          PROD_BUCKET / DEV_BUCKET
//! bucket:workflow         workflows     (inherited)
//! bucket:package          packages      (inherited)
//! bucket:template         templates     (inherited)
//! bucket:cursor           cursors       (inherited)
//! bucket:downloaded-at    downloaded-at (inherited)
//! ```

use std::sync::LazyLock;

use crate::env::EnvironmentTag;
use crate::key::join_key;

/// Base prefix of the root bucket.
pub const ROOT_BASE: &str = "bucket";

/// Binding used when the environment tag is the production marker.
pub const PRODUCTION_BINDING: &str = "PROD_BUCKET";

/// Binding used in every other environment.
pub const NON_PRODUCTION_BINDING: &str = "DEV_BUCKET";

/// Picks a binding name for an environment tag. Two tiers only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingRule {
    pub production: &'static str,
    pub non_production: &'static str,
}

impl BindingRule {
    pub const fn new(production: &'static str, non_production: &'static str) -> Self {
        Self {
            production,
            non_production,
        }
    }

    pub fn pick(&self, tag: &EnvironmentTag) -> &'static str {
        if tag.is_production() {
            self.production
        } else {
            self.non_production
        }
    }
}

impl Default for BindingRule {
    fn default() -> Self {
        Self::new(PRODUCTION_BINDING, NON_PRODUCTION_BINDING)
    }
}

/// A named storage domain: a short key, its composed base prefix, and the
/// rule selecting its binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketDescriptor {
    key: &'static str,
    base: String,
    rule: BindingRule,
}

impl BucketDescriptor {
    /// A top-level bucket whose base is `key` itself.
    pub fn root(key: &'static str, rule: BindingRule) -> Self {
        Self {
            key,
            base: key.to_string(),
            rule,
        }
    }

    /// A child bucket under `self`, inheriting the binding rule.
    pub fn child(&self, key: &'static str) -> Self {
        Self {
            key,
            base: join_key([self.base.as_str(), key]),
            rule: self.rule,
        }
    }

    /// Short name of this bucket.
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Fully composed key prefix.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn rule(&self) -> BindingRule {
        self.rule
    }

    /// Binding name this bucket resolves to under `tag`.
    pub fn binding_name(&self, tag: &EnvironmentTag) -> &'static str {
        self.rule.pick(tag)
    }
}

pub static ROOT: LazyLock<BucketDescriptor> =
    LazyLock::new(|| BucketDescriptor::root(ROOT_BASE, BindingRule::default()));

/// Workflow run artifacts.
pub static WORKFLOWS: LazyLock<BucketDescriptor> = LazyLock::new(|| ROOT.child("workflow"));

/// Published package tarballs.
pub static PACKAGES: LazyLock<BucketDescriptor> = LazyLock::new(|| ROOT.child("package"));

/// Project templates.
pub static TEMPLATES: LazyLock<BucketDescriptor> = LazyLock::new(|| ROOT.child("template"));

/// Per-repository cursors, stored as ordinary items.
pub static CURSORS: LazyLock<BucketDescriptor> = LazyLock::new(|| ROOT.child("cursor"));

/// Last-download timestamps.
pub static DOWNLOADED_AT: LazyLock<BucketDescriptor> =
    LazyLock::new(|| ROOT.child("downloaded-at"));

/// Every declared descriptor, root first.
pub fn descriptors() -> [&'static BucketDescriptor; 6] {
    [
        &*ROOT,
        &*WORKFLOWS,
        &*PACKAGES,
        &*TEMPLATES,
        &*CURSORS,
        &*DOWNLOADED_AT,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_base() {
        assert_eq!(ROOT.base(), "bucket");
        assert_eq!(ROOT.key(), "bucket");
    }

    #[test]
    fn child_bases() {
        assert_eq!(PACKAGES.base(), "bucket:package");
        assert_eq!(PACKAGES.key(), "package");
        assert_eq!(WORKFLOWS.base(), "bucket:workflow");
        assert_eq!(TEMPLATES.base(), "bucket:template");
        assert_eq!(CURSORS.base(), "bucket:cursor");
        assert_eq!(DOWNLOADED_AT.base(), "bucket:downloaded-at");
    }

    #[test]
    fn grandchildren_extend_prefix() {
        let nightly = PACKAGES.child("nightly");
        assert_eq!(nightly.base(), "bucket:package:nightly");
        assert_eq!(nightly.rule(), ROOT.rule());
    }

    #[test]
    fn production_selects_production_binding() {
        let tag = EnvironmentTag::production();
        assert_eq!(ROOT.binding_name(&tag), PRODUCTION_BINDING);
        assert_eq!(PACKAGES.binding_name(&tag), PRODUCTION_BINDING);
    }

    #[test]
    fn flipping_tag_flips_selection() {
        for tag in ["development", "preview", "staging", ""] {
            let tag = EnvironmentTag::new(tag);
            assert_eq!(ROOT.binding_name(&tag), NON_PRODUCTION_BINDING);
            assert_eq!(CURSORS.binding_name(&tag), NON_PRODUCTION_BINDING);
        }
    }

    #[test]
    fn children_share_one_binding() {
        let tag = EnvironmentTag::default();
        let names: Vec<_> = descriptors().iter().map(|d| d.binding_name(&tag)).collect();
        assert!(names.iter().all(|n| *n == NON_PRODUCTION_BINDING));
    }

    #[test]
    fn descriptors_are_distinct() {
        let bases: std::collections::HashSet<_> = descriptors().iter().map(|d| d.base()).collect();
        assert_eq!(bases.len(), 6);
    }
}
