//! Mapping entries to platform bundle tasks.

use std::path::{Path, PathBuf};

use rnws_shared::{BundleTask, Platform};

/// Where the iOS app expects its bundle, relative to the project root.
pub const IOS_TARGET: &[&str] = &["ios", "main.jsbundle"];

/// Where the Android app expects its bundle, relative to the project root.
pub const ANDROID_TARGET: &[&str] = &[
    "android",
    "app",
    "src",
    "main",
    "assets",
    "index.android.bundle",
];

/// Bundle mode options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    /// Produce the iOS bundle.
    pub ios: bool,
    /// Produce the Android bundle.
    pub android: bool,
    pub ios_entry: String,
    pub android_entry: String,
    /// Target paths are resolved against this directory.
    pub project_root: PathBuf,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            ios: true,
            android: true,
            ios_entry: "index.ios".into(),
            android_entry: "index.android".into(),
            project_root: PathBuf::from("."),
        }
    }
}

/// What bundle mode does with one configured entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTarget {
    Ios,
    Android,
    Skip,
}

/// Classify an entry by exact name. The iOS entry wins when both names match.
pub fn classify_entry(entry: &str, options: &BundleOptions) -> EntryTarget {
    if entry == options.ios_entry {
        if options.ios {
            EntryTarget::Ios
        } else {
            EntryTarget::Skip
        }
    } else if entry == options.android_entry {
        if options.android {
            EntryTarget::Android
        } else {
            EntryTarget::Skip
        }
    } else {
        EntryTarget::Skip
    }
}

/// One task per platform, in entry order. Repeated entries are planned once.
pub fn plan_tasks(entries: &[String], options: &BundleOptions) -> Vec<BundleTask> {
    let mut tasks: Vec<BundleTask> = Vec::new();

    for entry in entries {
        let (platform, target) = match classify_entry(entry, options) {
            EntryTarget::Ios => (Platform::Ios, IOS_TARGET),
            EntryTarget::Android => (Platform::Android, ANDROID_TARGET),
            EntryTarget::Skip => continue,
        };
        if tasks.iter().any(|t| t.platform == platform) {
            continue;
        }

        tasks.push(BundleTask {
            platform,
            entry_name: entry.clone(),
            bundle_path: format!("/{entry}.bundle"),
            target_path: join_all(&options.project_root, target),
        });
    }

    tasks
}

fn join_all(root: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(root.to_path_buf(), |path, part| path.join(part))
}
