// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Indexed storage of package records.

A [PackageDb] maps package names to version-sorted collections of records
and answers bounded range queries over versions. Inserting a concrete
package that `Provides` names also maintains synthesized virtual records
under each provided name.
*/

use {
    crate::{
        package::{Package, Provider},
        package_version::PackageVersion,
    },
    std::{cmp::Ordering, collections::BTreeMap},
};

/// One entry of the serialized selection listing handed to downstream
/// download and unpack stages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManifestEntry {
    pub name: String,
    pub version: String,
    pub urls: Vec<String>,
}

/// A name-indexed, version-sorted container of package records.
///
/// For any name the container holds at most one concrete record per
/// distinct version plus at most one virtual record aggregating every
/// provider of that name. Iteration order is deterministic: names in
/// lexicographic order, then versions ascending, with a concrete record
/// ordering before a virtual record of the same version.
#[derive(Clone, Debug, Default)]
pub struct PackageDb {
    packages: BTreeMap<String, Vec<Package>>,
}

/// Ordering of records within a per-name collection.
fn entry_order(a: &Package, b: &Package) -> Ordering {
    a.version
        .cmp(&b.version)
        .then_with(|| a.is_virtual.cmp(&b.is_virtual))
}

impl PackageDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record at `(name, version)`.
    ///
    /// Inserting a concrete record with a non-empty `Provides` list
    /// synthesizes or extends a virtual record under each provided name. The
    /// virtual record's version is the provided version when specified, else
    /// the concrete record's version.
    pub fn add(&mut self, pkg: Package) {
        if !pkg.is_virtual {
            for provided in pkg.provides.clone() {
                let version = provided.version.unwrap_or_else(|| pkg.version.clone());

                self.add_provider(
                    provided.name,
                    version,
                    Provider {
                        name: pkg.name.clone(),
                        version: pkg.version.clone(),
                    },
                );
            }
        }

        self.insert_entry(pkg);
    }

    /// Bulk [Self::add].
    pub fn add_all(&mut self, packages: impl IntoIterator<Item = Package>) {
        for pkg in packages {
            self.add(pkg);
        }
    }

    fn insert_entry(&mut self, pkg: Package) {
        let entries = self.packages.entry(pkg.name.clone()).or_default();

        if pkg.is_virtual {
            // A name has at most one virtual record; extension merges the
            // provider lists regardless of the provided version.
            if let Some(existing) = entries.iter_mut().find(|entry| entry.is_virtual) {
                for provider in pkg.providers {
                    if !existing.providers.iter().any(|p| {
                        p.name == provider.name
                            && p.version.cmp(&provider.version) == Ordering::Equal
                    }) {
                        existing.providers.push(provider);
                    }
                }

                return;
            }
        }

        match entries.binary_search_by(|probe| entry_order(probe, &pkg)) {
            Ok(pos) => entries[pos] = pkg,
            Err(pos) => entries.insert(pos, pkg),
        }
    }

    fn add_provider(&mut self, name: String, version: PackageVersion, provider: Provider) {
        self.insert_entry(Package::new_virtual(name, version, provider));
    }

    /// Remove the exact `(name, version)` record.
    ///
    /// Removing a concrete record also removes its contribution to each
    /// provided virtual record; a virtual record left with no providers is
    /// deleted.
    pub fn remove(&mut self, pkg: &Package) {
        let mut removed = None;

        if let Some(entries) = self.packages.get_mut(&pkg.name) {
            if let Some(pos) = entries.iter().position(|entry| {
                entry.is_virtual == pkg.is_virtual
                    && entry.version.cmp(&pkg.version) == Ordering::Equal
            }) {
                removed = Some(entries.remove(pos));
            }

            if entries.is_empty() {
                self.packages.remove(&pkg.name);
            }
        }

        let removed = match removed {
            Some(removed) => removed,
            None => return,
        };

        if removed.is_virtual {
            return;
        }

        for provided in &removed.provides {
            if let Some(entries) = self.packages.get_mut(&provided.name) {
                if let Some(pos) = entries.iter().position(|entry| entry.is_virtual) {
                    let virtual_entry = &mut entries[pos];
                    virtual_entry.providers.retain(|p| {
                        !(p.name == removed.name
                            && p.version.cmp(&removed.version) == Ordering::Equal)
                    });

                    if virtual_entry.providers.is_empty() {
                        entries.remove(pos);
                    }
                }

                if entries.is_empty() {
                    self.packages.remove(&provided.name);
                }
            }
        }
    }

    /// All records under `name`, sorted by version ascending.
    pub fn get(&self, name: &str) -> Vec<Package> {
        self.packages.get(name).cloned().unwrap_or_default()
    }

    /// The record under `name` matching `version` exactly.
    pub fn exactly_equal(&self, name: &str, version: &PackageVersion) -> Option<Package> {
        self.packages.get(name).and_then(|entries| {
            entries
                .iter()
                .find(|entry| entry.version.cmp(version) == Ordering::Equal)
                .cloned()
        })
    }

    fn range(
        &self,
        name: &str,
        version: &PackageVersion,
        keep: impl Fn(Ordering) -> bool,
    ) -> Vec<Package> {
        self.packages
            .get(name)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| keep(entry.version.cmp(version)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records under `name` with version `<=` the given version.
    pub fn earlier_or_equal(&self, name: &str, version: &PackageVersion) -> Vec<Package> {
        self.range(name, version, |ord| ord != Ordering::Greater)
    }

    /// Records under `name` with version `<` the given version.
    pub fn strictly_earlier(&self, name: &str, version: &PackageVersion) -> Vec<Package> {
        self.range(name, version, |ord| ord == Ordering::Less)
    }

    /// Records under `name` with version `>=` the given version.
    pub fn later_or_equal(&self, name: &str, version: &PackageVersion) -> Vec<Package> {
        self.range(name, version, |ord| ord != Ordering::Less)
    }

    /// Records under `name` with version `>` the given version.
    pub fn strictly_later(&self, name: &str, version: &PackageVersion) -> Vec<Package> {
        self.range(name, version, |ord| ord == Ordering::Greater)
    }

    /// Iterate all records in deterministic order: by name, then version.
    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values().flatten()
    }

    /// Total number of records, virtual records included.
    pub fn len(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// The ordered `(name, version, urls)` listing persisted for downstream
    /// consumers.
    pub fn selection_manifest(&self) -> Vec<ManifestEntry> {
        self.iter()
            .map(|pkg| ManifestEntry {
                name: pkg.name.clone(),
                version: pkg.version.to_string(),
                urls: pkg.urls.clone(),
            })
            .collect()
    }
}
