//! Backend selection.
//!
//! Works out which backend identifiers the registry should construct by
//! identifier (as opposed to the ones found on disk by discovery):
//!
//! 1. explicit overrides from configuration, current key first, then legacy key
//! 2. the platform default, unless defaults are disabled
//! 3. minus anything already loaded
//!
//! Unknown platforms are not an error: they just get no default backend.

use crate::backends::{DIRECT_AND_RAW_INPUT, DIRECT_INPUT, LINUX, OSX};

/// Characters that separate identifiers in an override list.
const DELIMITERS: &[char] = &[' ', '\t', '\n', '\r', '\x0c', ',', ';', ':'];

/// Platform string prefix shared by every Windows release.
const WINDOWS_PREFIX: &str = "Windows";

/// Splits an override list into identifiers, keeping order and duplicates.
pub fn tokenize_backend_list(list: &str) -> impl Iterator<Item = &str> + '_ {
    list.split(DELIMITERS).filter(|token| !token.is_empty())
}

/// Default backend identifier for a platform string.
///
/// Exact matches come from a static table. Unrecognised Windows releases fall back
/// to the DirectInput + Raw Input backend with a warning; anything else has no
/// default and logs a warning.
pub fn default_backend_for(platform: &str) -> Option<&'static str> {
    let platform = platform.trim();
    match platform {
        "Linux" => Some(LINUX),
        "Mac OS X" => Some(OSX),
        "Windows" | "Windows XP" | "Windows Vista" | "Windows 7" | "Windows 8"
        | "Windows 8.1" | "Windows 10" | "Windows 11" => Some(DIRECT_AND_RAW_INPUT),
        "Windows 98" | "Windows 2000" => Some(DIRECT_INPUT),
        other if other.starts_with(WINDOWS_PREFIX) => {
            tracing::warn!(
                target: "stickenv::selector",
                platform = other,
                backend = DIRECT_AND_RAW_INPUT,
                "unknown Windows version, using the default Windows backend"
            );
            Some(DIRECT_AND_RAW_INPUT)
        }
        other => {
            tracing::warn!(
                target: "stickenv::selector",
                platform = other,
                "platform not recognised, no default backend"
            );
            None
        }
    }
}

/// Resolves the ordered list of backend identifiers to construct.
///
/// `overrides` are raw configuration values (each may hold several identifiers).
/// Identifiers equal to one in `loaded` are skipped; duplicates within the
/// overrides themselves are kept so the caller sees them in configured order.
pub fn resolve<S, L>(
    platform: &str,
    overrides: &[S],
    defaults_enabled: bool,
    loaded: &[L],
) -> Vec<String>
where
    S: AsRef<str>,
    L: AsRef<str>,
{
    let mut ids: Vec<String> = overrides
        .iter()
        .flat_map(|list| tokenize_backend_list(list.as_ref()))
        .map(str::to_string)
        .collect();

    if defaults_enabled {
        if let Some(default) = default_backend_for(platform) {
            ids.push(default.to_string());
        }
    }

    ids.retain(|id| {
        let already = loaded.iter().any(|l| l.as_ref() == id);
        if already {
            tracing::debug!(
                target: "stickenv::selector",
                backend = %id,
                "already loaded, skipping"
            );
        }
        !already
    });
    ids
}

/// Whether a default-backend flag leaves defaults enabled.
///
/// Only a value that is case-insensitively `"false"` disables them.
pub fn flag_enables_defaults(flag: Option<&str>) -> bool {
    !flag.is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
}
