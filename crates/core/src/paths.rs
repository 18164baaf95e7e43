//! Path resolver: canonical directories and filenames for role artifacts.
//!
//! A role's directory is computed from a [`PathTemplate`]; the `PUBLISH/`
//! and `_WIP/` folders sit beneath it. Directories are created lazily on
//! resolution (`mkdir -p` semantics). No validation of path length or
//! illegal characters is performed: OS failures surface as
//! [`CoreError::Io`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::naming;
use crate::roles::RoleConfig;

// ---------------------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------------------

/// Top-level folder holding every shot.
pub const SHOTS_DIR: &str = "SHOTS";

/// Folder holding assembly documents.
pub const ASSEMBLY_DIR: &str = "ASSEMBLY";

/// Folder holding the canonical publish artifact of a role.
pub const PUBLISH_DIR: &str = "PUBLISH";

/// Folder holding WIP snapshots of a role (sibling of [`PUBLISH_DIR`]).
pub const WIP_DIR: &str = "_WIP";

/// Template placeholders.
pub mod placeholders {
    pub const ROOT: &str = "{root}";
    pub const PROJECT_CODE: &str = "{projectCode}";
    pub const SHOT: &str = "{shot}";
    pub const ROLE: &str = "{role}";
    pub const ASSET_NAME: &str = "{assetName}";
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Where a role keeps its artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "preset", content = "template", rename_all = "snake_case")]
pub enum PathTemplate {
    /// `{root}/SHOTS/{shot}/{role}`
    #[default]
    Shots,
    /// `{root}/ASSETS/CHARACTERS/{assetName}/{role}`
    Character,
    /// `{root}/ASSETS/PROPS/{assetName}/{role}`
    Prop,
    /// Fully custom template string taken from the role configuration.
    Custom(String),
}

impl PathTemplate {
    /// The raw template string for this preset.
    pub fn pattern(&self) -> &str {
        match self {
            Self::Shots => "{root}/SHOTS/{shot}/{role}",
            Self::Character => "{root}/ASSETS/CHARACTERS/{assetName}/{role}",
            Self::Prop => "{root}/ASSETS/PROPS/{assetName}/{role}",
            Self::Custom(pattern) => pattern,
        }
    }

    /// Whether this template is rooted at an asset rather than a shot.
    pub fn is_asset_rooted(&self) -> bool {
        matches!(self, Self::Character | Self::Prop)
    }
}

/// Values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub root: &'a Path,
    pub project_code: &'a str,
    pub shot: &'a str,
    pub role: &'a str,
    pub asset_name: &'a str,
}

/// Substitute every placeholder in `pattern`.
///
/// Unknown placeholders are left untouched.
pub fn render_template(pattern: &str, vars: &TemplateVars<'_>) -> String {
    let root = vars.root.to_string_lossy();
    pattern
        .replace(placeholders::ROOT, root.trim_end_matches(['/', '\\']))
        .replace(placeholders::PROJECT_CODE, vars.project_code)
        .replace(placeholders::SHOT, vars.shot)
        .replace(placeholders::ROLE, vars.role)
        .replace(placeholders::ASSET_NAME, vars.asset_name)
}

// ---------------------------------------------------------------------------
// Workspace addressing
// ---------------------------------------------------------------------------

/// Project-level addressing context shared by every resolver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
    pub prefix: String,
    pub extension: String,
}

/// The shot or asset an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity<'a> {
    Shot(&'a str),
    Asset(&'a str),
}

impl<'a> Entity<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Self::Shot(name) | Self::Asset(name) => name,
        }
    }
}

/// Resolved locations for one (entity, role) artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleLocation {
    pub role_dir: PathBuf,
    pub publish_dir: PathBuf,
    pub wip_dir: PathBuf,
    pub publish_path: PathBuf,
    /// Publish filename without extension; WIP names extend it.
    pub stem: String,
}

impl RoleLocation {
    /// Path of the WIP snapshot with the given version number.
    pub fn wip_path(&self, version: u32, ext: &str) -> PathBuf {
        self.wip_dir
            .join(naming::wip_filename_for_stem(&self.stem, version, ext))
    }
}

impl Workspace {
    pub fn new(
        root: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// `<root>/SHOTS`
    pub fn shots_dir(&self) -> PathBuf {
        self.root.join(SHOTS_DIR)
    }

    /// Compute the locations for `role` without touching the filesystem.
    pub fn locate(&self, role: &RoleConfig, entity: Entity<'_>) -> RoleLocation {
        let (shot, asset_name) = match entity {
            Entity::Shot(name) => (name, ""),
            Entity::Asset(name) => ("", name),
        };
        let vars = TemplateVars {
            root: &self.root,
            project_code: &self.prefix,
            shot,
            role: &role.id,
            asset_name,
        };
        let role_dir = PathBuf::from(render_template(role.template.pattern(), &vars));
        let publish_dir = role_dir.join(PUBLISH_DIR);
        let wip_dir = role_dir.join(WIP_DIR);
        let file_name =
            naming::publish_filename(&self.prefix, entity.name(), &role.id, &self.extension);
        let stem = file_stem(&file_name);

        RoleLocation {
            publish_path: publish_dir.join(&file_name),
            role_dir,
            publish_dir,
            wip_dir,
            stem,
        }
    }

    /// Compute the locations for `role` and create its directories.
    pub fn resolve(
        &self,
        role: &RoleConfig,
        entity: Entity<'_>,
    ) -> Result<RoleLocation, CoreError> {
        let location = self.locate(role, entity);
        std::fs::create_dir_all(&location.publish_dir)?;
        std::fs::create_dir_all(&location.wip_dir)?;
        Ok(location)
    }
}

// ---------------------------------------------------------------------------
// Assembly layout
// ---------------------------------------------------------------------------

/// Where shot assembly documents live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyLayout {
    /// `SHOTS/ASSEMBLY/<prefix>_<shot>_ASSEMBLY.ext` (canonical).
    #[default]
    ProjectScoped,
    /// `SHOTS/<shot>/ASSEMBLY/<prefix>_<shot>_ASSEMBLY.ext` (legacy, read-only).
    ShotScoped,
}

impl Workspace {
    /// Assembly document path for `shot` under the given layout.
    pub fn assembly_path(&self, shot: &str, layout: AssemblyLayout) -> PathBuf {
        let file_name = naming::assembly_filename(&self.prefix, shot, &self.extension);
        match layout {
            AssemblyLayout::ProjectScoped => self.shots_dir().join(ASSEMBLY_DIR).join(file_name),
            AssemblyLayout::ShotScoped => self
                .shots_dir()
                .join(shot)
                .join(ASSEMBLY_DIR)
                .join(file_name),
        }
    }
}

/// Filename without its final extension.
pub fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

/// The `_WIP/` directory that sits next to the `PUBLISH/` folder of `publish_path`.
pub fn sibling_wip_dir(publish_path: &Path) -> Option<PathBuf> {
    let publish_dir = publish_path.parent()?;
    let role_dir = publish_dir.parent()?;
    Some(role_dir.join(WIP_DIR))
}

/// The `PUBLISH/` file corresponding to a WIP snapshot path.
///
/// Strips the WIP marker and version from the filename and swaps the
/// `_WIP/` folder for `PUBLISH/`. Returns `None` when `wip_path` does not
/// have WIP shape.
pub fn publish_path_for_wip(wip_path: &Path) -> Option<PathBuf> {
    let wip_dir = wip_path.parent()?;
    if wip_dir.file_name()? != WIP_DIR {
        return None;
    }
    let file_name = wip_path.file_name()?.to_str()?;
    naming::parse_wip_version(file_name)?;

    let stem = file_stem(file_name);
    let base = stem
        .rfind(naming::WIP_MARKER)
        .or_else(|| stem.rfind("_v"))
        .map(|idx| &stem[..idx])?;
    let ext = wip_path.extension().map(|e| e.to_string_lossy().into_owned());
    let publish_name = match ext {
        Some(ext) => format!("{base}.{ext}"),
        None => base.to_string(),
    };

    Some(wip_dir.parent()?.join(PUBLISH_DIR).join(publish_name))
}
