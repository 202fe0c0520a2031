use std::process::Command;

/// Short hash of the checked-out commit, when built from a git tree.
fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_owned()).filter(|h| !h.is_empty())
}

fn main() {
    // `mpulse --version` prints both values
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let commit = git_short_hash().unwrap_or_else(|| "unknown".into());
    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".into());
    for (key, value) in [("GIT_COMMIT_HASH", commit), ("TARGET", target)] {
        println!("cargo:rustc-env={key}={value}");
    }
}
