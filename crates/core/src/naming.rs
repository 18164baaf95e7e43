//! Artifact naming convention engine.
//!
//! Generates deterministic filenames for publish, WIP, and assembly
//! artifacts from the project prefix, entity (shot or asset) name, and role.
//! Every generated name embeds the project prefix.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::CoreError;

/// Marker inserted between the role and the version number of a WIP file.
pub const WIP_MARKER: &str = "_WIP_";

/// Suffix of assembly document stems.
pub const ASSEMBLY_SUFFIX: &str = "_ASSEMBLY";

/// Minimum rendered width of a version number.
pub const VERSION_WIDTH: usize = 3;

/// Maximum number of characters in a derived project prefix.
pub const MAX_PREFIX_LEN: usize = 4;

/// Render a version number zero-padded to at least [`VERSION_WIDTH`] digits.
///
/// ```
/// use shotline_core::naming::format_version;
///
/// assert_eq!(format_version(7), "007");
/// assert_eq!(format_version(1000), "1000");
/// ```
pub fn format_version(version: u32) -> String {
    format!("{version:0width$}", width = VERSION_WIDTH)
}

/// Canonical publish filename.
///
/// Convention: `{prefix}_{entity}_{role}.{ext}`
///
/// ```
/// use shotline_core::naming::publish_filename;
///
/// assert_eq!(publish_filename("ABC", "SHOT_010", "ANIM", "blend"), "ABC_SHOT_010_ANIM.blend");
/// ```
pub fn publish_filename(prefix: &str, entity: &str, role: &str, ext: &str) -> String {
    format!("{prefix}_{entity}_{role}.{ext}")
}

/// WIP snapshot filename.
///
/// Convention: `{prefix}_{entity}_{role}_WIP_{NNN}.{ext}`
///
/// ```
/// use shotline_core::naming::wip_filename;
///
/// assert_eq!(
///     wip_filename("ABC", "SHOT_010", "ANIM", 1, "blend"),
///     "ABC_SHOT_010_ANIM_WIP_001.blend"
/// );
/// ```
pub fn wip_filename(prefix: &str, entity: &str, role: &str, version: u32, ext: &str) -> String {
    format!(
        "{prefix}_{entity}_{role}{WIP_MARKER}{}.{ext}",
        format_version(version)
    )
}

/// Assembly document filename: `{prefix}_{shot}_ASSEMBLY.{ext}`.
pub fn assembly_filename(prefix: &str, shot: &str, ext: &str) -> String {
    format!("{prefix}_{shot}{ASSEMBLY_SUFFIX}.{ext}")
}

/// The WIP filename for `version` that sits next to a publish file stem.
///
/// `stem` is the publish filename without extension.
pub fn wip_filename_for_stem(stem: &str, version: u32, ext: &str) -> String {
    format!("{stem}{WIP_MARKER}{}.{ext}", format_version(version))
}

fn wip_version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:_WIP_|_v)(\d{3,})(?:\.[^.]+)?$").expect("WIP version regex is valid")
    })
}

/// Extract the trailing version number from a WIP file name.
///
/// Accepts both the `_WIP_NNN` form and the legacy `_vNNN` form. Versions
/// with more than three digits are parsed numerically.
///
/// ```
/// use shotline_core::naming::parse_wip_version;
///
/// assert_eq!(parse_wip_version("ABC_SHOT_010_ANIM_WIP_004.blend"), Some(4));
/// assert_eq!(parse_wip_version("ABC_SHOT_010_ANIM_v012.blend"), Some(12));
/// assert_eq!(parse_wip_version("ABC_SHOT_010_ANIM.blend"), None);
/// ```
pub fn parse_wip_version(file_name: &str) -> Option<u32> {
    wip_version_regex()
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn wip_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:_WIP_|_v)(\d{3,})(?:\.[^.]+)?$").expect("WIP suffix regex is valid")
    })
}

/// Version of `file_name` if it is a WIP snapshot of the publish `stem`.
///
/// Unlike [`parse_wip_version`], the whole name must be `stem` followed by
/// the version suffix, so `ABC_S_ANIM2_WIP_001` is not a WIP of `ABC_S_ANIM`.
///
/// ```
/// use shotline_core::naming::wip_version_for_stem;
///
/// assert_eq!(wip_version_for_stem("ABC_S_ANIM_WIP_002.blend", "ABC_S_ANIM"), Some(2));
/// assert_eq!(wip_version_for_stem("ABC_S_ANIM2_WIP_002.blend", "ABC_S_ANIM"), None);
/// ```
pub fn wip_version_for_stem(file_name: &str, stem: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(stem)?;
    wip_suffix_regex()
        .captures(rest)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Format a numbered shot id: `SHOT_010`.
pub fn shot_id(number: u32) -> String {
    format!("SHOT_{number:03}")
}

/// Whether `name` is a numbered shot id (`SHOT_` followed by 3+ digits).
///
/// ```
/// use shotline_core::naming::is_shot_id;
///
/// assert!(is_shot_id("SHOT_010"));
/// assert!(!is_shot_id("forest_intro"));
/// ```
pub fn is_shot_id(name: &str) -> bool {
    name.strip_prefix("SHOT_")
        .is_some_and(|n| n.len() >= 3 && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Derive the short project prefix from a project name.
///
/// Multi-word names use their initials (up to [`MAX_PREFIX_LEN`]); single
/// words use their first three alphanumeric characters. Always uppercase.
///
/// ```
/// use shotline_core::naming::derive_prefix;
///
/// assert_eq!(derive_prefix("Another Big Cartoon"), "ABC");
/// assert_eq!(derive_prefix("spring"), "SPR");
/// ```
pub fn derive_prefix(project_name: &str) -> String {
    let words: Vec<String> = project_name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    let prefix: String = match words.as_slice() {
        [] => String::new(),
        [single] => single.chars().take(3).collect(),
        many => many
            .iter()
            .filter_map(|w| w.chars().next())
            .take(MAX_PREFIX_LEN)
            .collect(),
    };

    prefix.to_ascii_uppercase()
}

/// Validate a shot, asset, or role name used in generated paths.
pub fn validate_entity_name(kind: &str, name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(format!("{kind} name must not be empty")));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(CoreError::Validation(format!(
            "{kind} name '{name}' must not contain path separators"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_name() {
        assert_eq!(
            publish_filename("ABC", "SHOT_010", "ANIM", "blend"),
            "ABC_SHOT_010_ANIM.blend"
        );
    }

    #[test]
    fn wip_name_padding() {
        assert_eq!(
            wip_filename("ABC", "SHOT_010", "LIGHT", 42, "blend"),
            "ABC_SHOT_010_LIGHT_WIP_042.blend"
        );
    }

    #[test]
    fn wip_name_past_999_keeps_digits() {
        assert_eq!(
            wip_filename("ABC", "SHOT_010", "ANIM", 1000, "blend"),
            "ABC_SHOT_010_ANIM_WIP_1000.blend"
        );
        assert_eq!(
            parse_wip_version("ABC_SHOT_010_ANIM_WIP_1000.blend"),
            Some(1000)
        );
    }

    #[test]
    fn assembly_name() {
        assert_eq!(
            assembly_filename("ABC", "SHOT_010", "blend"),
            "ABC_SHOT_010_ASSEMBLY.blend"
        );
    }

    #[test]
    fn parse_rejects_short_numbers() {
        assert_eq!(parse_wip_version("ABC_SHOT_010_ANIM_WIP_01.blend"), None);
    }

    #[test]
    fn parse_without_extension() {
        assert_eq!(parse_wip_version("ABC_SHOT_010_ANIM_WIP_003"), Some(3));
    }

    #[test]
    fn stem_match_requires_exact_base() {
        assert_eq!(wip_version_for_stem("ABC_S_ANIM_v003.blend", "ABC_S_ANIM"), Some(3));
        assert_eq!(wip_version_for_stem("ABC_S_ANIM.blend", "ABC_S_ANIM"), None);
        assert_eq!(wip_version_for_stem("XYZ_S_ANIM_WIP_001.blend", "ABC_S_ANIM"), None);
    }

    #[test]
    fn shot_id_padding() {
        assert_eq!(shot_id(10), "SHOT_010");
        assert_eq!(shot_id(1200), "SHOT_1200");
        assert!(is_shot_id(&shot_id(1200)));
        assert!(!is_shot_id("SHOT_01"));
        assert!(!is_shot_id("SHOT_01a"));
    }

    #[test]
    fn prefix_initials_capped() {
        assert_eq!(derive_prefix("the quick brown fox jumps"), "TQBF");
    }

    #[test]
    fn prefix_ignores_punctuation() {
        assert_eq!(derive_prefix("my-film_2"), "MF2");
        assert_eq!(derive_prefix("  "), "");
    }

    #[test]
    fn entity_name_validation() {
        assert!(validate_entity_name("Shot", "SHOT_010").is_ok());
        assert!(validate_entity_name("Shot", "").is_err());
        assert!(validate_entity_name("Shot", "a/b").is_err());
        assert!(validate_entity_name("Shot", "..").is_err());
    }
}
