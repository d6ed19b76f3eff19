//! Built-in advisory tables for library and container scans.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::types::Severity;

/// One advisory entry, keyed by `name:version` or `image:tag`.
#[derive(Debug, Clone, Copy)]
pub struct Advisory {
    pub id: &'static str,
    pub cve: Option<&'static str>,
    pub severity: Severity,
    pub title: &'static str,
    pub description: &'static str,
    pub fixed_in: Option<&'static str>,
}

static PACKAGE_ADVISORIES: Lazy<HashMap<&'static str, Vec<Advisory>>> = Lazy::new(|| {
    HashMap::from([
        (
            "lodash:4.17.15",
            vec![
                Advisory {
                    id: "CVE-2020-8203",
                    cve: Some("CVE-2020-8203"),
                    severity: Severity::High,
                    title: "Prototype pollution in zipObjectDeep",
                    description: "zipObjectDeep allows prototype pollution via crafted property paths.",
                    fixed_in: Some("4.17.19"),
                },
                Advisory {
                    id: "CVE-2021-23337",
                    cve: Some("CVE-2021-23337"),
                    severity: Severity::High,
                    title: "Command injection in template",
                    description: "The template function allows command injection via the variable option.",
                    fixed_in: Some("4.17.21"),
                },
            ],
        ),
        (
            "event-stream:3.3.6",
            vec![Advisory {
                id: "GHSA-mh6f-8j2x-4483",
                cve: None,
                severity: Severity::Critical,
                title: "Malicious flatmap-stream dependency",
                description: "This release pulls in flatmap-stream, which steals cryptocurrency wallet keys.",
                fixed_in: Some("4.0.0"),
            }],
        ),
        (
            "minimist:1.2.5",
            vec![Advisory {
                id: "CVE-2021-44906",
                cve: Some("CVE-2021-44906"),
                severity: Severity::Critical,
                title: "Prototype pollution in setKey",
                description: "Crafted arguments can pollute Object.prototype.",
                fixed_in: Some("1.2.6"),
            }],
        ),
        (
            "axios:0.21.0",
            vec![Advisory {
                id: "CVE-2020-28168",
                cve: Some("CVE-2020-28168"),
                severity: Severity::Medium,
                title: "Server-side request forgery via redirects",
                description: "Following a redirect can bypass proxy configuration.",
                fixed_in: Some("0.21.1"),
            }],
        ),
        (
            "node-fetch:2.6.0",
            vec![Advisory {
                id: "CVE-2022-0235",
                cve: Some("CVE-2022-0235"),
                severity: Severity::High,
                title: "Exposure of sensitive information on redirect",
                description: "Cookie and authorization headers are forwarded to third-party hosts on redirect.",
                fixed_in: Some("2.6.7"),
            }],
        ),
        (
            "log4j-core:2.14.1",
            vec![Advisory {
                id: "CVE-2021-44228",
                cve: Some("CVE-2021-44228"),
                severity: Severity::Critical,
                title: "Remote code execution via JNDI lookup (Log4Shell)",
                description: "Attacker-controlled log messages can trigger JNDI lookups and load remote code.",
                fixed_in: Some("2.15.0"),
            }],
        ),
        (
            "jquery:3.4.1",
            vec![Advisory {
                id: "CVE-2020-11022",
                cve: Some("CVE-2020-11022"),
                severity: Severity::Medium,
                title: "Cross-site scripting in htmlPrefilter",
                description: "Passing untrusted HTML to DOM manipulation methods may execute scripts.",
                fixed_in: Some("3.5.0"),
            }],
        ),
        (
            "ua-parser-js:0.7.29",
            vec![Advisory {
                id: "GHSA-pjwm-rvh2-c87w",
                cve: None,
                severity: Severity::Critical,
                title: "Hijacked release installs malware",
                description: "The published package was compromised and installs a cryptominer and credential stealer.",
                fixed_in: Some("0.7.30"),
            }],
        ),
    ])
});

static LATEST_VERSIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("lodash", "4.17.21"),
        ("express", "4.19.2"),
        ("react", "18.3.1"),
        ("axios", "1.7.2"),
        ("minimist", "1.2.8"),
        ("node-fetch", "3.3.2"),
        ("jquery", "3.7.1"),
        ("moment", "2.30.1"),
        ("chalk", "5.3.0"),
        ("commander", "12.1.0"),
        ("log4j-core", "2.23.1"),
        ("ua-parser-js", "1.0.38"),
        ("event-stream", "4.0.1"),
        ("left-pad", "1.3.0"),
    ])
});

static PACKAGE_LICENSES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("lodash", "MIT"),
        ("express", "MIT"),
        ("react", "MIT"),
        ("axios", "MIT"),
        ("minimist", "MIT"),
        ("node-fetch", "MIT"),
        ("jquery", "MIT"),
        ("moment", "MIT"),
        ("chalk", "MIT"),
        ("commander", "MIT"),
        ("debug", "MIT"),
        ("request", "Apache-2.0"),
        ("typescript", "Apache-2.0"),
        ("log4j-core", "Apache-2.0"),
        ("ua-parser-js", "MIT"),
        ("event-stream", "MIT"),
        ("left-pad", "WTFPL"),
        ("readline-sync", "MIT"),
        ("mysql", "MIT"),
        ("ghostscript4js", "AGPL-3.0"),
    ])
});

/// Popular package names that typosquatters imitate.
pub const WELL_KNOWN_PACKAGES: &[&str] = &[
    "lodash",
    "express",
    "react",
    "axios",
    "request",
    "chalk",
    "moment",
    "commander",
    "debug",
    "webpack",
    "typescript",
    "jquery",
    "underscore",
    "electron",
    "mongoose",
    "crossenv",
    "cross-env",
];

static IMAGE_ADVISORIES: Lazy<HashMap<&'static str, Advisory>> = Lazy::new(|| {
    let eol = |id, title, description| Advisory {
        id,
        cve: None,
        severity: Severity::High,
        title,
        description,
        fixed_in: None,
    };
    HashMap::from([
        (
            "node:10",
            eol(
                "EOL-NODE-10",
                "End-of-life Node.js 10 base image",
                "Node.js 10 no longer receives security fixes.",
            ),
        ),
        (
            "python:2.7",
            eol(
                "EOL-PYTHON-2.7",
                "End-of-life Python 2.7 base image",
                "Python 2.7 no longer receives security fixes.",
            ),
        ),
        (
            "ubuntu:14.04",
            eol(
                "EOL-UBUNTU-14.04",
                "End-of-life Ubuntu 14.04 base image",
                "Ubuntu 14.04 is out of standard support.",
            ),
        ),
        (
            "centos:6",
            eol(
                "EOL-CENTOS-6",
                "End-of-life CentOS 6 base image",
                "CentOS 6 no longer receives updates.",
            ),
        ),
        (
            "debian:8",
            eol(
                "EOL-DEBIAN-8",
                "End-of-life Debian 8 base image",
                "Debian 8 (jessie) is out of long-term support.",
            ),
        ),
        (
            "alpine:3.4",
            Advisory {
                id: "CVE-2019-5021",
                cve: Some("CVE-2019-5021"),
                severity: Severity::Critical,
                title: "Empty root password in Alpine image",
                description: "Official Alpine images shipped with a blank root password.",
                fixed_in: Some("3.10"),
            },
        ),
    ])
});

/// Base images whose default user is root.
pub const ROOT_DEFAULT_IMAGES: &[&str] = &[
    "ubuntu", "debian", "centos", "alpine", "node", "python", "nginx", "redis", "postgres",
    "mysql", "busybox",
];

pub fn package_advisories(name: &str, version: &str) -> &'static [Advisory] {
    PACKAGE_ADVISORIES
        .get(format!("{}:{}", name, version).as_str())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

pub fn latest_version(name: &str) -> Option<&'static str> {
    LATEST_VERSIONS.get(name).copied()
}

pub fn package_license(name: &str) -> Option<&'static str> {
    PACKAGE_LICENSES.get(name).copied()
}

pub fn image_advisory(image: &str, tag: &str) -> Option<&'static Advisory> {
    IMAGE_ADVISORIES.get(format!("{}:{}", image, tag).as_str())
}

/// Last path segment of an image reference (`docker.io/library/node` -> `node`).
pub fn base_image_name(image: &str) -> &str {
    image.rsplit('/').next().unwrap_or(image)
}
