// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Second-stage provisioning of an assembled root filesystem.

Runs inside (or against) the unpacked image after package contents are in
place: optional slimming, then group and user creation in recipe order.
*/

use {crate::error::Result, std::path::Path, tracing::info};

pub mod accounts;
pub mod slimify;

use {
    accounts::{AccountEditor, Group, User},
    slimify::PatternSet,
};

/// Recipe-derived second-stage configuration.
#[derive(Clone, Debug, Default)]
pub struct ProvisionConfig {
    /// Whether to remove the built-in slim pattern set from the image.
    pub slimify: bool,
    pub groups: Vec<Group>,
    pub users: Vec<User>,
}

/// Apply second-stage provisioning to the root filesystem at `root`.
///
/// Groups are created before users so user definitions can reference them.
pub fn provision(root: &Path, config: &ProvisionConfig) -> Result<()> {
    if config.slimify {
        info!("slimifying image");

        slimify::slimify(root, &PatternSet::built_in())?;
    }

    let editor = AccountEditor::new(root);

    for group in &config.groups {
        info!(name = %group.name, "creating or updating group");

        editor.create_or_update_group(group)?;
    }

    for user in &config.users {
        info!(name = %user.name, "creating or updating user");

        editor.create_or_update_user(user)?;
    }

    Ok(())
}
