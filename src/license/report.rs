//! Markdown compliance report.
//!
//! Section order is fixed (Summary, Conflicts, Package Licenses) and package
//! rows are sorted, so the same input always renders byte-identical output.

use std::fmt::Write;

use super::DependencyTreeResult;

pub fn render(result: &DependencyTreeResult) -> String {
    let total = result.packages.len();
    let compatible = result.packages.iter().filter(|p| p.result.compatible).count();

    let mut out = String::new();
    out.push_str("# License Compliance Report\n\n");

    out.push_str("## Summary\n\n");
    let _ = writeln!(out, "- Packages: {}", total);
    let _ = writeln!(out, "- Compatible: {}", compatible);
    let _ = writeln!(out, "- Incompatible: {}", total - compatible);
    let _ = writeln!(out, "- Conflicts: {}", result.conflicts.len());
    let _ = writeln!(
        out,
        "- Overall: {}",
        if result.overall_compatible {
            "COMPATIBLE"
        } else {
            "INCOMPATIBLE"
        }
    );
    out.push('\n');

    out.push_str("## Conflicts\n\n");
    if result.conflicts.is_empty() {
        out.push_str("No conflicts found.\n");
    } else {
        for c in &result.conflicts {
            let _ = writeln!(
                out,
                "- {} ({}) / {} ({}): {}",
                c.package_a, c.license_a, c.package_b, c.license_b, c.reason
            );
        }
    }
    if !result.warnings.is_empty() {
        out.push_str("\n### Warnings\n\n");
        for w in &result.warnings {
            let _ = writeln!(out, "- {}", w);
        }
    }
    out.push('\n');

    out.push_str("## Package Licenses\n\n");
    out.push_str("| Package | Version | License | Type | Compatible |\n");
    out.push_str("|---------|---------|---------|------|------------|\n");
    let mut rows: Vec<_> = result.packages.iter().collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
    for p in rows {
        let license = p
            .result
            .spdx_id
            .clone()
            .unwrap_or_else(|| p.result.license.clone());
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            p.name,
            p.version,
            license,
            p.result.license_type.as_str(),
            if p.result.compatible { "yes" } else { "no" }
        );
    }

    out
}
