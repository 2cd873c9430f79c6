// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Transitive package dependency resolution.

Given a populated [PackageDb], a list of `name[=version]` includes, and a
list of `name[=version]` excludes, [resolve] computes a database holding a
satisfying package set: the transitive dependency closure of the includes,
pruned of unsatisfiable candidates, reduced to the newest version per name.

Selection is greedy rather than solver-driven. When the greedy choice
prunes the only satisfying assignment the resolver reports the loss instead
of backtracking. Negative relationships (`Conflicts`, `Breaks`,
`Replaces`) are not evaluated, so a selected set may contain packages that
a full solver would reject.
*/

use {
    crate::{
        dependency::VersionOperator,
        error::{Result, RootfsError},
        package::Package,
        package_db::PackageDb,
        package_version::PackageVersion,
    },
    std::collections::{BTreeMap, HashSet, VecDeque},
    tracing::debug,
};

/// Parse a `name[=version]` request into its parts.
fn parse_name_version(s: &str) -> Result<(String, Option<PackageVersion>)> {
    match s.split_once('=') {
        Some((name, version)) => Ok((name.to_string(), Some(PackageVersion::parse(version)?))),
        None => Ok((s.to_string(), None)),
    }
}

/// Resolve the dependencies of the included packages.
///
/// Returns a freshly owned database holding the selected set. The source
/// database is never mutated.
pub fn resolve(
    package_db: &PackageDb,
    includes: &[impl AsRef<str>],
    excludes: &[impl AsRef<str>],
) -> Result<PackageDb> {
    let mut excluded = HashSet::new();
    for exclude in excludes {
        let (name, _) = parse_name_version(exclude.as_ref())?;
        excluded.insert(name);
    }

    let mut requested: BTreeMap<String, Option<PackageVersion>> = BTreeMap::new();
    let mut candidate_db = PackageDb::new();

    for include in includes {
        let include = include.as_ref();
        let (name, version) = parse_name_version(include)?;

        if let Some(version) = &version {
            let pkg = package_db
                .exactly_equal(&name, version)
                .ok_or_else(|| RootfsError::PackageNotFound(include.to_string()))?;

            candidate_db.add(pkg);
        } else {
            let packages = package_db.get(&name);
            if packages.is_empty() {
                return Err(RootfsError::PackageNotFound(include.to_string()));
            }

            candidate_db.add_all(packages);
        }

        requested.insert(name, version);
    }

    debug!("building dependency tree");

    let mut queue: VecDeque<Package> = candidate_db.iter().cloned().collect();
    let mut visited = HashSet::new();

    while let Some(pkg) = queue.pop_front() {
        if !visited.insert(pkg.id()) {
            continue;
        }

        let deps = get_dependencies(package_db, &candidate_db, &pkg)?;

        for dep in deps {
            if excluded.contains(&dep.name) {
                continue;
            }

            if !visited.contains(&dep.id()) {
                candidate_db.add(dep.clone());
                queue.push_back(dep);
            }
        }
    }

    debug!("pruning candidates with unsatisfiable dependencies");

    prune_unsatisfied(&mut candidate_db, package_db);

    // When multiple versions of a package remain, keep the newest.
    // TODO: replace the greedy newest-first choice with a real solver once
    // one is needed; conflicts handling would land there too.
    debug!("selecting newest version of each package");

    let mut selected_db = PackageDb::new();
    for pkg in candidate_db.iter() {
        // A package requested at an explicit version is only selectable at
        // that version.
        if let Some(Some(version)) = requested.get(&pkg.name) {
            if pkg.version.cmp(version) == std::cmp::Ordering::Equal {
                selected_db.add(pkg.clone());
            }
            continue;
        }

        let existing = selected_db.get(&pkg.name);
        if let Some(existing) = existing.first() {
            if pkg.version > existing.version {
                let existing = existing.clone();
                selected_db.remove(&existing);
                selected_db.add(pkg.clone());
            }
        } else {
            selected_db.add(pkg.clone());
        }
    }

    prune_unsatisfied(&mut selected_db, package_db);

    debug!("confirming requested packages are still selected");

    for (name, version) in &requested {
        match version {
            Some(version) => {
                if selected_db.exactly_equal(name, version).is_none() {
                    return Err(RootfsError::RequestedLost(format!("{}={}", name, version)));
                }
            }
            None => {
                if selected_db.get(name).is_empty() {
                    return Err(RootfsError::RequestedLost(name.clone()));
                }
            }
        }
    }

    Ok(selected_db)
}

/// Iteratively remove candidates whose dependencies cannot be satisfied.
fn prune_unsatisfied(candidate_db: &mut PackageDb, package_db: &PackageDb) {
    loop {
        let mut prune_list = vec![];

        let candidates: Vec<Package> = candidate_db.iter().cloned().collect();
        for pkg in &candidates {
            if let Err(e) = get_dependencies(package_db, candidate_db, pkg) {
                debug!(
                    name = %pkg.name,
                    version = %pkg.version,
                    error = %e,
                    "pruning unsatisfiable candidate"
                );

                prune_list.push(pkg.clone());
            }
        }

        if prune_list.is_empty() {
            break;
        }

        for pkg in prune_list {
            candidate_db.remove(&pkg);
        }
    }
}

/// Compute the required-dependency list for a package.
///
/// `Pre-Depends` relations are considered before `Depends`. Every relation
/// must be satisfied by at least one possibility; the candidates satisfying
/// the first satisfiable possibility are all emitted (a later prune keeps
/// only what is needed).
fn get_dependencies(
    package_db: &PackageDb,
    candidate_db: &PackageDb,
    pkg: &Package,
) -> Result<Vec<Package>> {
    let mut dependencies = vec![];

    for relation in pkg.pre_depends.iter().chain(pkg.depends.iter()) {
        let mut resolved = false;

        for possibility in &relation.possibilities {
            let package_list = match &possibility.constraint {
                // TODO: << and >> are evaluated as their inclusive
                // counterparts. Tightening this requires validating the
                // change against a full archive index first.
                Some((VersionOperator::StrictlyEarlier, version))
                | Some((VersionOperator::EarlierOrEqual, version)) => {
                    package_db.earlier_or_equal(&possibility.name, version)
                }
                Some((VersionOperator::ExactlyEqual, version)) => package_db
                    .exactly_equal(&possibility.name, version)
                    .into_iter()
                    .collect(),
                Some((VersionOperator::LaterOrEqual, version))
                | Some((VersionOperator::StrictlyLater, version)) => {
                    package_db.later_or_equal(&possibility.name, version)
                }
                None => package_db.get(&possibility.name),
            };

            let mut resolved_packages = vec![];
            for candidate in package_list {
                if candidate.is_virtual {
                    match resolve_virtual(package_db, candidate_db, &candidate) {
                        Ok(provider) => resolved_packages.push(provider),
                        Err(e) => {
                            debug!(
                                name = %candidate.name,
                                version = %candidate.version,
                                error = %e,
                                "failed to resolve virtual package"
                            );
                        }
                    }
                } else {
                    resolved_packages.push(candidate);
                }
            }

            if !resolved_packages.is_empty() {
                dependencies.extend(resolved_packages);
                resolved = true;
                break;
            }
        }

        if !resolved {
            return Err(RootfsError::Unsatisfiable(relation.to_string()));
        }
    }

    Ok(dependencies)
}

/// Resolve a virtual package to one of its concrete providers.
///
/// A single provider wins outright. With several, a provider already in the
/// candidate set is preferred, then a unique provider of `required`
/// priority. Anything else is ambiguous.
fn resolve_virtual(
    package_db: &PackageDb,
    candidate_db: &PackageDb,
    virtual_pkg: &Package,
) -> Result<Package> {
    let providers = virtual_pkg
        .providers
        .iter()
        .filter_map(|provider| package_db.exactly_equal(&provider.name, &provider.version))
        .collect::<Vec<_>>();

    if providers.is_empty() {
        return Err(RootfsError::Unsatisfiable(virtual_pkg.name.clone()));
    }

    if providers.len() == 1 {
        return Ok(providers.into_iter().next().expect("length checked"));
    }

    if let Some(provider) = providers
        .iter()
        .find(|pkg| candidate_db.exactly_equal(&pkg.name, &pkg.version).is_some())
    {
        return Ok(provider.clone());
    }

    let required = providers
        .iter()
        .filter(|pkg| pkg.priority.as_deref() == Some("required"))
        .collect::<Vec<_>>();

    if let [provider] = required.as_slice() {
        return Ok((*provider).clone());
    }

    Err(RootfsError::AmbiguousVirtual(virtual_pkg.name.clone()))
}
