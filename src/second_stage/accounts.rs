// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! POSIX account database mutation.

Creates and updates entries in `/etc/passwd`, `/etc/group`, `/etc/shadow`
and `/etc/gshadow` beneath a target root. Each file is rewritten in place
after a fsync-backed backup at `{path}-`: lines belonging to the entry are
replaced, all other lines are kept verbatim, and a missing entry is
appended.
*/

use {
    crate::error::{Result, RootfsError},
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        collections::BTreeMap,
        io::{Read, Seek, SeekFrom, Write},
        os::unix::fs::{OpenOptionsExt, PermissionsExt},
        path::{Path, PathBuf},
    },
    tracing::warn,
};

const SYSTEM_ID_MIN: u32 = 100;
const SYSTEM_ID_MAX: u32 = 999;
const USER_ID_MIN: u32 = 1000;
const USER_ID_MAX: u32 = 60000;

/// Aging fields emitted on shadow entries: a fixed epoch day plus the
/// stock min/max/warn policy.
const SHADOW_AGING: &str = "19928:0:99999:7:::";

static VALID_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9._-]{0,31}$").unwrap());

/// A group to create or update.
#[derive(Clone, Debug, Default)]
pub struct Group {
    pub name: String,
    pub gid: Option<u32>,
    pub system: bool,
    pub members: Vec<String>,
}

/// A user to create or update.
#[derive(Clone, Debug, Default)]
pub struct User {
    pub name: String,
    pub uid: Option<u32>,
    /// Group names or numeric ids; the first entry is the primary group.
    pub groups: Vec<String>,
    pub home_dir: String,
    pub shell: String,
    /// Plaintext password; empty disables password login.
    pub password: String,
    pub system: bool,
}

/// Mutator for the account databases beneath a target root.
pub struct AccountEditor {
    root: PathBuf,
    passwd_path: PathBuf,
    shadow_path: PathBuf,
    group_path: PathBuf,
    gshadow_path: PathBuf,
}

impl AccountEditor {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();

        Self {
            passwd_path: root.join("etc/passwd"),
            shadow_path: root.join("etc/shadow"),
            group_path: root.join("etc/group"),
            gshadow_path: root.join("etc/gshadow"),
            root,
        }
    }

    /// Create or update a group entry in `group` and `gshadow`.
    pub fn create_or_update_group(&self, group: &Group) -> Result<()> {
        if !VALID_NAME.is_match(&group.name) {
            return Err(RootfsError::InvalidName(group.name.clone()));
        }

        let gid = match group.gid {
            Some(gid) => gid,
            None => self.next_free_gid(group.system)?,
        };

        let members = deduplicate(&group.members).join(",");

        update_file(
            &self.group_path,
            0o644,
            &group.name,
            &format!("{}:x:{}:{}", group.name, gid, members),
        )?;

        if !self.gshadow_path.exists() {
            warn!("no gshadow file found, skipping");
            return Ok(());
        }

        update_file(
            &self.gshadow_path,
            0o400,
            &group.name,
            &format!("{}:!::{}", group.name, members),
        )?;

        Ok(())
    }

    /// Create or update a user entry across `passwd`, `shadow`, and the
    /// user's groups.
    pub fn create_or_update_user(&self, user: &User) -> Result<()> {
        if !VALID_NAME.is_match(&user.name) {
            return Err(RootfsError::InvalidName(user.name.clone()));
        }

        if user.groups.is_empty() {
            return Err(RootfsError::NoGroups(user.name.clone()));
        }

        let groups = self.load_groups()?;

        let lookup_group = |reference: &str| -> Result<Group> {
            let found = if let Ok(gid) = reference.parse::<u32>() {
                groups.get(&gid).cloned()
            } else {
                groups
                    .values()
                    .find(|group| group.name == reference)
                    .cloned()
            };

            found.ok_or_else(|| RootfsError::GroupNotFound {
                user: user.name.clone(),
                group: reference.to_string(),
            })
        };

        let primary_group = lookup_group(&user.groups[0])?;
        let primary_gid = primary_group.gid.expect("loaded groups carry a gid");

        let uid = match user.uid {
            Some(uid) => uid,
            None => self.next_free_uid(user.system)?,
        };

        let home_dir = if user.home_dir.is_empty() {
            format!("/home/{}", user.name)
        } else {
            user.home_dir.clone()
        };

        self.create_home_dir(&home_dir, uid, primary_gid)?;

        let shell = if user.shell.is_empty() {
            "/usr/sbin/nologin".to_string()
        } else {
            user.shell.clone()
        };

        update_file(
            &self.passwd_path,
            0o644,
            &user.name,
            &format!(
                "{}:x:{}:{}::{}:{}",
                user.name, uid, primary_gid, home_dir, shell
            ),
        )?;

        self.update_shadow(user)?;

        for reference in &user.groups {
            let mut group = lookup_group(reference)?;
            group.members.push(user.name.clone());

            self.create_or_update_group(&group)?;
        }

        Ok(())
    }

    fn update_shadow(&self, user: &User) -> Result<()> {
        if !self.shadow_path.exists() {
            if !user.password.is_empty() {
                return Err(RootfsError::ShadowRequired);
            }

            warn!("no shadow file found, skipping");
            return Ok(());
        }

        let password_hash = if user.password.is_empty() {
            "!".to_string()
        } else {
            bcrypt::hash(&user.password, bcrypt::DEFAULT_COST)?
        };

        update_file(
            &self.shadow_path,
            0o400,
            &user.name,
            &format!("{}:{}:{}", user.name, password_hash, SHADOW_AGING),
        )
    }

    fn create_home_dir(&self, home_dir: &str, uid: u32, gid: u32) -> Result<()> {
        let rooted = self.root.join(home_dir.trim_start_matches('/'));

        std::fs::create_dir_all(&rooted)
            .map_err(|e| RootfsError::IoPath(rooted.display().to_string(), e))?;

        std::fs::set_permissions(&rooted, std::fs::Permissions::from_mode(0o700))
            .map_err(|e| RootfsError::IoPath(rooted.display().to_string(), e))?;

        match std::os::unix::fs::chown(&rooted, Some(uid), Some(gid)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!(path = %rooted.display(), "insufficient privileges to chown home directory");
                Ok(())
            }
            Err(e) => Err(RootfsError::IoPath(rooted.display().to_string(), e)),
        }
    }

    fn next_free_uid(&self, system: bool) -> Result<u32> {
        let users = self.load_uids()?;

        let (min, max) = if system {
            (SYSTEM_ID_MIN, SYSTEM_ID_MAX)
        } else {
            (USER_ID_MIN, USER_ID_MAX)
        };

        (min..=max)
            .find(|uid| !users.contains(uid))
            .ok_or(RootfsError::IdExhausted)
    }

    fn next_free_gid(&self, system: bool) -> Result<u32> {
        let groups = self.load_groups()?;

        let (min, max) = if system {
            (SYSTEM_ID_MIN, SYSTEM_ID_MAX)
        } else {
            (USER_ID_MIN, USER_ID_MAX)
        };

        (min..=max)
            .find(|gid| !groups.contains_key(gid))
            .ok_or(RootfsError::IdExhausted)
    }

    fn load_uids(&self) -> Result<Vec<u32>> {
        let mut uids = vec![];

        for line in read_entry_lines(&self.passwd_path)? {
            let fields = line.split(':').collect::<Vec<_>>();
            if fields.len() < 7 {
                return Err(RootfsError::MalformedAccountEntry(line));
            }

            uids.push(fields[2].parse::<u32>()?);
        }

        Ok(uids)
    }

    fn load_groups(&self) -> Result<BTreeMap<u32, Group>> {
        let mut groups = BTreeMap::new();

        for line in read_entry_lines(&self.group_path)? {
            let fields = line.split(':').collect::<Vec<_>>();
            if fields.len() < 4 {
                return Err(RootfsError::MalformedAccountEntry(line));
            }

            let gid = fields[2].parse::<u32>()?;

            let members = if fields[3].is_empty() {
                vec![]
            } else {
                fields[3].split(',').map(ToString::to_string).collect()
            };

            groups.insert(
                gid,
                Group {
                    name: fields[0].to_string(),
                    gid: Some(gid),
                    system: gid < USER_ID_MIN,
                    members,
                },
            );
        }

        Ok(groups)
    }
}

/// Read the non-comment lines of a colon-separated account file.
fn read_entry_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RootfsError::IoPath(path.display().to_string(), e))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

/// Rewrite an account file in place.
///
/// A backup is written to `{path}-` and synced before the live file is
/// touched. Lines beginning with `{name}:` are replaced with `entry`; all
/// other lines are kept verbatim. If no line matched, `entry` is appended.
fn update_file(path: &Path, mode: u32, name: &str, entry: &str) -> Result<()> {
    let io_err = |e: std::io::Error| RootfsError::IoPath(path.display().to_string(), e);

    backup_file(path).map_err(io_err)?;

    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(mode)
        .open(path)
        .map_err(io_err)?;

    let mut content = String::new();
    file.read_to_string(&mut content).map_err(io_err)?;

    let prefix = format!("{}:", name);
    let mut found = false;

    let mut updated = String::new();
    for line in content.lines() {
        let line = line.trim();

        if line.starts_with(&prefix) {
            updated.push_str(entry);
            found = true;
        } else {
            updated.push_str(line);
        }
        updated.push('\n');
    }

    if !found {
        updated.push_str(entry);
        updated.push('\n');
    }

    file.set_len(0).map_err(io_err)?;
    file.seek(SeekFrom::Start(0)).map_err(io_err)?;
    file.write_all(updated.as_bytes()).map_err(io_err)?;

    Ok(())
}

fn backup_file(path: &Path) -> std::io::Result<()> {
    let backup_path = {
        let mut os_string = path.as_os_str().to_os_string();
        os_string.push("-");
        PathBuf::from(os_string)
    };

    let data = std::fs::read(path)?;
    let permissions = std::fs::metadata(path)?.permissions();

    let mut backup = std::fs::File::create(&backup_path)?;
    backup.write_all(&data)?;
    backup.sync_all()?;

    std::fs::set_permissions(&backup_path, permissions)?;

    Ok(())
}

/// Deduplicate preserving first-seen order.
fn deduplicate(members: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    members
        .iter()
        .filter(|member| seen.insert(member.as_str()))
        .cloned()
        .collect()
}
