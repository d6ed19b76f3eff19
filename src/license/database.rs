//! Built-in license database and synonym table.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Broad license category used by policy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    Permissive,
    Copyleft,
    Proprietary,
    Unknown,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permissive => "permissive",
            Self::Copyleft => "copyleft",
            Self::Proprietary => "proprietary",
            Self::Unknown => "unknown",
        }
    }
}

/// Static facts about one license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub name: String,
    pub spdx_id: String,
    #[serde(rename = "type")]
    pub license_type: LicenseType,
    pub obligations: Vec<String>,
    pub restrictions: Vec<String>,
    pub share_alike: bool,
    /// SPDX ids this license cannot be combined with.
    pub incompatible_with: Vec<String>,
}

impl LicenseInfo {
    /// Symmetric incompatibility: either side may declare the conflict.
    pub fn conflicts_with(&self, other: &LicenseInfo) -> bool {
        self.incompatible_with.iter().any(|id| id == &other.spdx_id)
            || other.incompatible_with.iter().any(|id| id == &self.spdx_id)
    }
}

struct Entry {
    spdx: &'static str,
    name: &'static str,
    kind: LicenseType,
    obligations: &'static [&'static str],
    restrictions: &'static [&'static str],
    share_alike: bool,
    incompatible: &'static [&'static str],
}

const NOTICE: &[&str] = &["Include copyright notice", "Include license text"];
const NO_LIABILITY: &[&str] = &["No liability", "No warranty"];
const GPL_OBLIGATIONS: &[&str] = &[
    "Disclose source",
    "Include copyright notice",
    "Include license text",
    "State changes",
    "Same license for derivatives",
];

const ENTRIES: &[Entry] = &[
    Entry {
        spdx: "MIT",
        name: "MIT License",
        kind: LicenseType::Permissive,
        obligations: NOTICE,
        restrictions: NO_LIABILITY,
        share_alike: false,
        incompatible: &[],
    },
    Entry {
        spdx: "ISC",
        name: "ISC License",
        kind: LicenseType::Permissive,
        obligations: NOTICE,
        restrictions: NO_LIABILITY,
        share_alike: false,
        incompatible: &[],
    },
    Entry {
        spdx: "BSD-2-Clause",
        name: "BSD 2-Clause \"Simplified\" License",
        kind: LicenseType::Permissive,
        obligations: NOTICE,
        restrictions: NO_LIABILITY,
        share_alike: false,
        incompatible: &[],
    },
    Entry {
        spdx: "BSD-3-Clause",
        name: "BSD 3-Clause \"New\" or \"Revised\" License",
        kind: LicenseType::Permissive,
        obligations: NOTICE,
        restrictions: &["No liability", "No warranty", "No endorsement"],
        share_alike: false,
        incompatible: &[],
    },
    Entry {
        spdx: "Apache-2.0",
        name: "Apache License 2.0",
        kind: LicenseType::Permissive,
        obligations: &[
            "Include copyright notice",
            "Include license text",
            "State changes",
            "Include NOTICE file",
        ],
        restrictions: &["No liability", "No warranty", "No trademark use"],
        share_alike: false,
        incompatible: &["GPL-2.0"],
    },
    Entry {
        spdx: "Unlicense",
        name: "The Unlicense",
        kind: LicenseType::Permissive,
        obligations: &[],
        restrictions: NO_LIABILITY,
        share_alike: false,
        incompatible: &[],
    },
    Entry {
        spdx: "0BSD",
        name: "BSD Zero Clause License",
        kind: LicenseType::Permissive,
        obligations: &[],
        restrictions: NO_LIABILITY,
        share_alike: false,
        incompatible: &[],
    },
    Entry {
        spdx: "MPL-2.0",
        name: "Mozilla Public License 2.0",
        kind: LicenseType::Copyleft,
        obligations: &["Disclose source of modified files", "Include license text"],
        restrictions: &["No liability", "No warranty", "No trademark use"],
        share_alike: true,
        incompatible: &[],
    },
    Entry {
        spdx: "LGPL-2.1",
        name: "GNU Lesser General Public License v2.1",
        kind: LicenseType::Copyleft,
        obligations: &["Disclose source of the library", "Include license text", "State changes"],
        restrictions: NO_LIABILITY,
        share_alike: true,
        incompatible: &["Proprietary"],
    },
    Entry {
        spdx: "LGPL-3.0",
        name: "GNU Lesser General Public License v3.0",
        kind: LicenseType::Copyleft,
        obligations: &["Disclose source of the library", "Include license text", "State changes"],
        restrictions: NO_LIABILITY,
        share_alike: true,
        incompatible: &["Proprietary", "GPL-2.0"],
    },
    Entry {
        spdx: "GPL-2.0",
        name: "GNU General Public License v2.0",
        kind: LicenseType::Copyleft,
        obligations: GPL_OBLIGATIONS,
        restrictions: NO_LIABILITY,
        share_alike: true,
        incompatible: &["Apache-2.0", "GPL-3.0", "AGPL-3.0", "Proprietary"],
    },
    Entry {
        spdx: "GPL-3.0",
        name: "GNU General Public License v3.0",
        kind: LicenseType::Copyleft,
        obligations: GPL_OBLIGATIONS,
        restrictions: NO_LIABILITY,
        share_alike: true,
        incompatible: &["GPL-2.0", "Proprietary"],
    },
    Entry {
        spdx: "AGPL-3.0",
        name: "GNU Affero General Public License v3.0",
        kind: LicenseType::Copyleft,
        obligations: &[
            "Disclose source",
            "Disclose source over network use",
            "Include copyright notice",
            "Include license text",
            "State changes",
            "Same license for derivatives",
        ],
        restrictions: NO_LIABILITY,
        share_alike: true,
        incompatible: &["GPL-2.0", "Proprietary"],
    },
    Entry {
        spdx: "Proprietary",
        name: "Proprietary License",
        kind: LicenseType::Proprietary,
        obligations: &["Follow vendor terms"],
        restrictions: &["No redistribution", "No modification"],
        share_alike: false,
        incompatible: &["GPL-2.0", "GPL-3.0", "AGPL-3.0"],
    },
];

static DATABASE: Lazy<BTreeMap<&'static str, LicenseInfo>> = Lazy::new(|| {
    ENTRIES
        .iter()
        .map(|e| {
            let info = LicenseInfo {
                name: e.name.to_string(),
                spdx_id: e.spdx.to_string(),
                license_type: e.kind,
                obligations: e.obligations.iter().map(|s| s.to_string()).collect(),
                restrictions: e.restrictions.iter().map(|s| s.to_string()).collect(),
                share_alike: e.share_alike,
                incompatible_with: e.incompatible.iter().map(|s| s.to_string()).collect(),
            };
            (e.spdx, info)
        })
        .collect()
});

/// Lower-cased free text → canonical SPDX id.
static SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("mit license", "MIT"),
        ("the mit license", "MIT"),
        ("expat", "MIT"),
        ("isc license", "ISC"),
        ("apache 2.0", "Apache-2.0"),
        ("apache-2", "Apache-2.0"),
        ("apache2", "Apache-2.0"),
        ("apache license 2.0", "Apache-2.0"),
        ("apache license, version 2.0", "Apache-2.0"),
        ("bsd", "BSD-3-Clause"),
        ("bsd-3", "BSD-3-Clause"),
        ("new bsd", "BSD-3-Clause"),
        ("bsd-2", "BSD-2-Clause"),
        ("simplified bsd", "BSD-2-Clause"),
        ("mpl 2.0", "MPL-2.0"),
        ("mpl2", "MPL-2.0"),
        ("mozilla public license 2.0", "MPL-2.0"),
        ("gpl", "GPL-3.0"),
        ("gpl3", "GPL-3.0"),
        ("gplv3", "GPL-3.0"),
        ("gpl-3", "GPL-3.0"),
        ("gpl-3.0-only", "GPL-3.0"),
        ("gpl-3.0-or-later", "GPL-3.0"),
        ("gpl-3.0+", "GPL-3.0"),
        ("gpl2", "GPL-2.0"),
        ("gplv2", "GPL-2.0"),
        ("gpl-2", "GPL-2.0"),
        ("gpl-2.0-only", "GPL-2.0"),
        ("gpl-2.0-or-later", "GPL-2.0"),
        ("gpl-2.0+", "GPL-2.0"),
        ("lgplv3", "LGPL-3.0"),
        ("lgpl-3.0-only", "LGPL-3.0"),
        ("lgpl-3.0-or-later", "LGPL-3.0"),
        ("lgplv2.1", "LGPL-2.1"),
        ("lgpl-2.1-only", "LGPL-2.1"),
        ("lgpl-2.1-or-later", "LGPL-2.1"),
        ("agplv3", "AGPL-3.0"),
        ("agpl-3.0-only", "AGPL-3.0"),
        ("agpl-3.0-or-later", "AGPL-3.0"),
        ("unlicensed", "Proprietary"),
        ("commercial", "Proprietary"),
        ("proprietary", "Proprietary"),
        ("public domain", "Unlicense"),
    ])
});

/// Map free text to a canonical SPDX id when recognised; otherwise return the
/// trimmed input unchanged.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('(').trim_end_matches(')').trim();
    if let Some(key) = DATABASE.keys().find(|k| k.eq_ignore_ascii_case(trimmed)) {
        return (*key).to_string();
    }
    let lower = trimmed.to_ascii_lowercase();
    match SYNONYMS.get(lower.as_str()) {
        Some(id) => (*id).to_string(),
        None => trimmed.to_string(),
    }
}

/// Look up a license by free text or SPDX id.
pub fn lookup(raw: &str) -> Option<&'static LicenseInfo> {
    DATABASE.get(normalize(raw).as_str())
}

/// All known SPDX ids, sorted.
pub fn known_ids() -> Vec<&'static str> {
    DATABASE.keys().copied().collect()
}
