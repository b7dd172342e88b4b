//! secvarctl - Secure boot variable management
//!
//! Command line front end for the secure variable engine.
//!
//! # Usage
//!
//! ```bash
//! secvarctl read                         # Describe PK, KEK, db, dbx (and TS)
//! secvarctl read -r db                   # Hex dump db
//! secvarctl validate db.auth             # Check an update file's format
//! secvarctl validate -x -v PK PK.esl     # Check a bare signature list
//! secvarctl verify -u db db.auth         # Check an update against the keys
//! secvarctl verify -u KEK k.auth -u db d.auth -w
//! secvarctl write db db.auth             # Queue an update (PowerNV)
//! ```

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use secvarctl::efi::auth::crypto::{CryptoProvider, RustCrypto};
use secvarctl::efi::auth::time::TimestampVariable;
use secvarctl::efi::auth::validate::{validate_auth, validate_cert_bytes, validate_esl, validate_ts};
use secvarctl::efi::auth::{
    SecureBootVariable, Verdict, format_guid, parse_signature_list, signature_type_name, verify_update,
};
use secvarctl::efi::varstore::{Backend, Overlay, SECVAR_FORMAT_PATH, VariableStore, detect_backend};
use secvarctl::{Error, ErrorKind, logger};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "secvarctl", bin_name = "secvarctl", version)]
#[command(about = "Read, validate and verify secure boot variables")]
struct Cli {
    /// Print debug output
    #[arg(short, long)]
    verbose: bool,

    /// Use the efivarfs layout instead of detecting the backend
    #[arg(long)]
    efivars: bool,

    /// Use the OpenSSL crypto provider
    #[arg(long)]
    openssl: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    usage: Option<bool>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PathArg {
    /// Sysfs directory holding the variables (default depends on backend)
    #[arg(short, long)]
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current secure variables
    Read {
        #[command(flatten)]
        path: PathArg,

        /// Dump raw bytes as hex instead of describing them
        #[arg(short, long)]
        raw: bool,

        /// Variables to read (default: all on this backend)
        vars: Vec<String>,
    },

    /// Queue an authenticated update (PowerNV only)
    Write {
        #[command(flatten)]
        path: PathArg,

        /// Skip validating the update file first
        #[arg(short, long)]
        force: bool,

        /// Variable to update
        var: String,

        /// Authenticated update file
        file: PathBuf,
    },

    /// Check that a file is well formed
    Validate {
        /// File is a bare signature list
        #[arg(short = 'x', long, conflicts_with_all = ["cert", "ts"])]
        esl: bool,

        /// File is a DER or PEM certificate
        #[arg(short, long, conflicts_with = "ts")]
        cert: bool,

        /// File is a TS variable
        #[arg(short, long)]
        ts: bool,

        /// Variable the file is meant for (enables PK rules)
        #[arg(short = 'v', long = "var")]
        var: Option<String>,

        /// File to check (default format: authenticated update)
        file: PathBuf,
    },

    /// Check updates against the current key hierarchy
    Verify {
        #[command(flatten)]
        path: PathArg,

        /// Update to check, applied in order
        #[arg(short, long = "update", num_args = 2, value_names = ["VAR", "FILE"], required = true)]
        updates: Vec<String>,

        /// Submit the updates if all of them are accepted
        #[arg(short, long)]
        write: bool,

        /// Allow updates while the authorizing variable is empty
        #[arg(long)]
        setup: bool,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(ErrorKind::ArgParseFail.exit_code() as u8)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    logger::init(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::from(exit_code(&err) as u8)
        }
    }
}

/// Exit code for the first engine error in the chain
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<Error>())
        .map(|e| e.kind())
        .unwrap_or(ErrorKind::InvalidFile)
        .exit_code()
}

fn run(cli: Cli) -> Result<()> {
    if cli.openssl {
        #[cfg(feature = "openssl")]
        return dispatch(&secvarctl::efi::auth::crypto::OpenSsl, cli);

        #[cfg(not(feature = "openssl"))]
        return Err(Error::ArgParseFail("built without OpenSSL support".into()).into());
    }
    dispatch(&RustCrypto, cli)
}

fn dispatch<P: CryptoProvider>(provider: &P, cli: Cli) -> Result<()> {
    log::debug!("Using {} crypto provider", provider.name());

    let open_store = |path: PathArg| {
        let kind = detect_backend(cli.efivars, Path::new(SECVAR_FORMAT_PATH));
        let store = Backend::open(kind, path.path);
        log::debug!("Using {:?} backend at {}", kind, store.root().display());
        store
    };

    match cli.command {
        Commands::Read { path, raw, vars } => cmd_read(provider, &open_store(path), &vars, raw),
        Commands::Write {
            path,
            force,
            var,
            file,
        } => cmd_write(provider, &open_store(path), &var, &file, force),
        Commands::Validate {
            esl,
            cert,
            ts,
            var,
            file,
        } => cmd_validate(provider, esl, cert, ts, var.as_deref(), &file),
        Commands::Verify {
            path,
            updates,
            write,
            setup,
        } => cmd_verify(provider, &open_store(path), &updates, write, setup),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
        .with_context(|| format!("reading {}", path.display()))
}

// ============================================================================
// read
// ============================================================================

fn cmd_read<P: CryptoProvider>(provider: &P, store: &Backend, names: &[String], raw: bool) -> Result<()> {
    let vars: Vec<SecureBootVariable> = if names.is_empty() {
        store.variables().to_vec()
    } else {
        names
            .iter()
            .map(|n| SecureBootVariable::from_name(n))
            .collect::<secvarctl::Result<_>>()?
    };

    let mut last_err = None;
    for var in vars {
        let value = match store.read_optional(var.name()) {
            Ok(Some(value)) => value,
            Ok(None) => {
                println!("{}: not present", var);
                continue;
            }
            Err(e) => {
                log::error!("Failed to read {}: {}", var, e);
                last_err = Some(e);
                continue;
            }
        };

        println!("{} ({} bytes):", var, value.size());
        if raw {
            print_hex(&value.data);
        } else if var.holds_signature_lists() {
            if let Err(e) = print_esl(provider, &value.data) {
                log::error!("{} is not a valid signature list: {}", var, e);
                last_err = Some(e);
            }
        } else {
            match TimestampVariable::parse(&value.data) {
                Ok(ts) => {
                    for (tracked, time) in ts.iter() {
                        println!("  {:<4} {}", tracked.name(), time);
                    }
                }
                Err(e) => {
                    log::error!("TS is invalid: {}", e);
                    last_err = Some(e);
                }
            }
        }
    }

    match last_err {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_esl<P: CryptoProvider>(provider: &P, data: &[u8]) -> secvarctl::Result<()> {
    if data.is_empty() {
        println!("  (empty)");
    }
    for (i, list) in parse_signature_list(data).enumerate() {
        let list = list?;
        println!(
            "  List {}: {}, {} entr{} of {} bytes",
            i,
            signature_type_name(list.signature_type()),
            list.signature_count(),
            if list.signature_count() == 1 { "y" } else { "ies" },
            list.signature_size()
        );
        for entry in list.signatures() {
            println!("    Owner: {}", format_guid(&entry.owner));
            if list.is_x509() {
                match provider.parse_x509(entry.payload) {
                    Ok(x509) => println!(
                        "    Certificate: {} (RSA {} bits)",
                        provider.x509_summary(&x509),
                        provider.x509_public_key_bits(&x509)
                    ),
                    Err(e) => println!("    Certificate: unparsable ({})", e),
                }
            } else {
                println!("    Data: {}", hex(entry.payload));
            }
        }
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn print_hex(data: &[u8]) {
    for (i, chunk) in data.chunks(16).enumerate() {
        let words: Vec<String> = chunk.chunks(2).map(hex).collect();
        println!("  {:08x}: {}", i * 16, words.join(" "));
    }
}

// ============================================================================
// write
// ============================================================================

fn cmd_write<P: CryptoProvider>(provider: &P, store: &Backend, name: &str, file: &Path, force: bool) -> Result<()> {
    let var = SecureBootVariable::from_name(name)?;
    let data = read_file(file)?;

    if force {
        log::warn!("Skipping validation of {}", file.display());
    } else {
        validate_auth(provider, &data, Some(var))
            .with_context(|| format!("{} is not a valid update", file.display()))?;
    }

    store.write_update(var.name(), &data)?;
    println!("Update for {} submitted", var);
    Ok(())
}

// ============================================================================
// validate
// ============================================================================

fn cmd_validate<P: CryptoProvider>(
    provider: &P,
    esl: bool,
    cert: bool,
    ts: bool,
    var: Option<&str>,
    file: &Path,
) -> Result<()> {
    let var = var.map(SecureBootVariable::from_name).transpose()?;
    let data = read_file(file)?;

    let what = if esl {
        let lists = validate_esl(provider, &data, var)?;
        format!("signature list file ({} list(s))", lists)
    } else if cert {
        validate_cert_bytes(provider, &data)?;
        "certificate".to_string()
    } else if ts {
        validate_ts(&data)?;
        "TS variable".to_string()
    } else {
        validate_auth(provider, &data, var)?;
        "authenticated update".to_string()
    };

    println!("{} is a valid {}", file.display(), what);
    Ok(())
}

// ============================================================================
// verify
// ============================================================================

fn cmd_verify<P: CryptoProvider>(
    provider: &P,
    store: &Backend,
    updates: &[String],
    write: bool,
    setup: bool,
) -> Result<()> {
    let mut overlay = Overlay::new(store);
    let mut accepted = Vec::new();

    for pair in updates.chunks(2) {
        let [name, file] = pair else {
            bail!(Error::ArgParseFail("--update takes VAR FILE".into()));
        };
        let var = SecureBootVariable::from_name(name)?;
        let file = Path::new(file);
        let data = read_file(file)?;

        match verify_update(provider, &overlay, var, &data, setup) {
            Verdict::Accepted(update) => {
                println!("{}: update {} accepted (signed {})", var, file.display(), update.timestamp);
                update.stage(&mut overlay)?;
                accepted.push((var, data));
            }
            Verdict::Rejected { state, error } => {
                return Err(anyhow::Error::new(error)
                    .context(format!("{}: update {} rejected while {}", var, file.display(), state)));
            }
        }
    }

    if write {
        for (var, data) in &accepted {
            store.write_update(var.name(), data)?;
            println!("{}: update submitted", var);
        }
    }
    Ok(())
}
