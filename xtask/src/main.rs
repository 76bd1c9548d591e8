use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const FUNCTIONS_PACKAGE: &str = "gcs_s3_relay_functions";
const FUNCTION_BINARIES: [&str; 2] = ["transfer_function", "cleanup_function"];

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the GCS to S3 relay workspace",
    long_about = "A unified CLI for running the relay functions locally, CI checks,\n\
                  and packaging deployable function artifacts."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one function binary locally (reads its settings from the environment)
    Serve {
        #[arg(value_enum)]
        function: Function,
        /// Listen port passed through as PORT
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Build both function binaries and zip each one for deployment
    Package {
        /// Compilation target triple for the function binaries
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Build profile used for binaries
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
        /// Directory that receives the zip artifacts
        #[arg(long, default_value = "dist")]
        out_dir: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Function {
    Transfer,
    Cleanup,
}

impl Function {
    fn binary(self) -> &'static str {
        match self {
            Self::Transfer => "transfer_function",
            Self::Cleanup => "cleanup_function",
        }
    }
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting and clippy
    Lint,
    /// Unit tests of both crates
    Test,
    /// Lint + test
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str], envs: &[(&str, String)]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .envs(envs.iter().map(|(key, value)| (*key, value.as_str())))
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    run_cargo_with_env(args, &[]);
}

fn run_cargo_with_env(args: &[&str], envs: &[(&str, String)]) {
    let status = cargo(args, envs);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn package_functions(target: &str, profile: BuildProfile, out_dir: &str) {
    ensure_rust_target_installed(target);

    step("Build function binaries");
    let mut cargo_args = vec!["build", "-p", FUNCTIONS_PACKAGE, "--target", target];
    for binary in FUNCTION_BINARIES {
        cargo_args.extend(["--bin", binary]);
    }
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);

    step("Package function zip artifacts");
    let target_dir = Path::new("target").join(target).join(profile.dir_name());
    let dist_dir = Path::new(out_dir);
    fs::create_dir_all(dist_dir).expect("failed to create dist directory");

    let mut packaged = Vec::with_capacity(FUNCTION_BINARIES.len());
    for binary in FUNCTION_BINARIES {
        let zip_path = dist_dir.join(format!("{binary}.zip"));
        package_function_zip(
            &target_dir.join(binary_name(binary, target)),
            binary,
            &zip_path,
        );
        packaged.push(zip_path);
    }

    eprintln!("\nPackaged artifacts:");
    for path in packaged {
        eprintln!("- {}", path.display());
    }
}

fn ensure_rust_target_installed(target: &str) {
    let output = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output();

    let output = match output {
        Ok(value) => value,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); continuing without target preflight"
            );
            return;
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "failed to list installed rust targets; run `rustup target list --installed` manually. details: {}",
            stderr.trim()
        );
    }

    let installed = String::from_utf8_lossy(&output.stdout);
    if !installed.lines().any(|line| line.trim() == target) {
        panic!(
            "required rust target `{target}` is not installed. install it with `rustup target add {target}` and re-run `cargo run -p xtask -- package`"
        );
    }
}

fn binary_name(bin_name: &str, target: &str) -> String {
    if target.contains("windows") {
        format!("{bin_name}.exe")
    } else {
        bin_name.to_string()
    }
}

fn package_function_zip(binary_path: &Path, entry_name: &str, zip_path: &Path) {
    if !binary_path.exists() {
        panic!("expected function binary at '{}'", binary_path.display());
    }

    let binary = fs::read(binary_path).expect("failed to read function binary");
    let file = fs::File::create(zip_path).expect("failed to create function zip");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file(entry_name, options)
        .expect("failed to start binary entry in function zip");
    zip.write_all(&binary).expect("failed to write binary entry");
    zip.finish().expect("failed to finish function zip");
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_lint() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);
}

fn ci_test() {
    step("Test gcs_s3_relay_core");
    run_cargo(&["test", "-p", "gcs_s3_relay_core"]);

    step("Test gcs_s3_relay_functions");
    run_cargo(&["test", "-p", FUNCTIONS_PACKAGE]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { function, port } => {
            run_cargo_with_env(
                &["run", "-p", FUNCTIONS_PACKAGE, "--bin", function.binary()],
                &[("PORT", port.to_string())],
            );
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Lint => ci_lint(),
                CiJob::Test => ci_test(),
                CiJob::Check => {
                    ci_lint();
                    ci_test();
                }
            }
            eprintln!("\nCI job passed.");
        }
        Commands::Package {
            target,
            profile,
            out_dir,
        } => {
            package_functions(&target, profile, &out_dir);
        }
    }
}
