// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reproducible Debian root filesystem construction primitives.

This crate implements the core of a declarative, reproducible container
root filesystem builder: it fetches signed package-archive metadata,
resolves a transitive dependency closure honoring version and
virtual-package constraints, and provisions the assembled root's account
databases and slim profile. Recipe parsing, image assembly, downloading,
and unpacking are the caller's concern.

# A Tour of Functionality

Package metadata is expressed in *control files*: paragraphs of key-value
fields. The [control] module parses them, synchronously and
asynchronously. [package_version::PackageVersion] implements the version
string algebra, including epoch handling and the tilde/digit-run
comparison rules. The [dependency] module parses the relationship
meta-language (`libc6 (>= 2.4), mawk | awk`).

A [source::Source] fetches a distribution's signed `InRelease` manifest
([release::ReleaseFile]), verifies it against a [keyring::Keyring], and
emits one [source::Component] per component and architecture. Components
download and decode their `Packages` index, verifying every byte against
the manifest digests via [io::HashingReader].

Decoded [package::Package] records populate a [package_db::PackageDb],
which keeps records name-indexed and version-sorted, answers bounded range
queries, and synthesizes virtual entries for provided names.
[resolver::resolve] computes the selected package set from include and
exclude requests: transitive closure, unsatisfiable pruning, newest-first
selection.

After the selected packages are downloaded and unpacked by external
tooling, [second_stage::provision] mutates the assembled root: account
database edits ([second_stage::accounts]) and pattern-driven slimming
([second_stage::slimify]).
*/

pub mod control;
pub mod dependency;
pub mod error;
pub mod io;
pub mod keyring;
pub mod package;
pub mod package_db;
pub mod package_version;
pub mod release;
pub mod resolver;
pub mod second_stage;
pub mod source;

#[cfg(test)]
mod testutil;
