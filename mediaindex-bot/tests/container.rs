//! Checks on the image recipe at the workspace root.

const DOCKERFILE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../Dockerfile"));

fn env_block() -> String {
    let start = DOCKERFILE.find("ENV TZ=").expect("ENV block");
    DOCKERFILE[start..]
        .lines()
        .take_while(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn timezone_build_arg_reaches_tz_and_the_bot() {
    let env = env_block();
    assert!(env.contains("TZ=$TIMEZONE"));
    assert!(env.contains("TIMEZONE=$TIMEZONE"));
    assert!(env.contains("DOWNLOAD_DIR=/tmp/mediainfo/"));
    assert!(DOCKERFILE.contains("ARG TIMEZONE=Asia/Kolkata"));
}

#[test]
fn dependencies_come_from_the_lockfile() {
    assert!(DOCKERFILE.contains("COPY Cargo.toml Cargo.lock ./"));
    assert!(DOCKERFILE.contains("cargo fetch --locked"));
    assert!(DOCKERFILE.contains("cargo build --release --locked -p mediaindex-bot"));
}

#[test]
fn runtime_has_probe_tools_and_scratch_dir() {
    for package in ["ffmpeg", "mediainfo", "tzdata", "ca-certificates"] {
        assert!(DOCKERFILE.contains(package), "{package} missing");
    }
    assert!(DOCKERFILE.contains("mkdir -p /tmp/mediainfo"));
    assert!(DOCKERFILE.contains(r#"ENTRYPOINT ["mediaindex-bot"]"#));
}
