//! PDF Seal command line
//!
//! Generate keys, sign PDFs with a QR verification stamp, and verify
//! submitted copies against the stored records.
//!
//! Usage:
//!   pdf_seal keygen [--bits 2048] [--out-dir keys]
//!   pdf_seal sign <input.pdf> --out <signed.pdf> [--issuer NAME] [--title TITLE]
//!                 [--label TEXT] [--store DIR] [--qr-out code.png]
//!   pdf_seal verify <document-id> <candidate.pdf> [--store DIR]
//!   pdf_seal key-info
//!
//! Keys are read from `PDF_SEAL_PRIVATE_KEY` / `PDF_SEAL_PUBLIC_KEY` first,
//! then from `keys/private.pem` / `keys/public.pem`. Set `RUST_LOG=info` for
//! progress output.
//!
//! Exit codes for `verify`: 0 VALID, 2 MODIFIED, 3 INVALID. Any error exits 1.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use pdf_seal::keys::{write_key_files, KeyManager, DEFAULT_KEY_BITS};
use pdf_seal::store::JsonFileStore;
use pdf_seal::{Error, Notary, SealConfig, SignRequest, VerificationStatus};

const DEFAULT_STORE_DIR: &str = "records";

enum Command {
    Keygen {
        bits: usize,
        out_dir: PathBuf,
    },
    Sign {
        input: PathBuf,
        output: PathBuf,
        issuer: String,
        title: Option<String>,
        label: Option<String>,
        store: PathBuf,
        qr_out: Option<PathBuf>,
    },
    Verify {
        document_id: String,
        candidate: PathBuf,
        store: PathBuf,
    },
    KeyInfo,
}

fn usage() -> &'static str {
    "Usage:\n  \
     pdf_seal keygen [--bits N] [--out-dir DIR]\n  \
     pdf_seal sign <input.pdf> --out <signed.pdf> [--issuer NAME] [--title TITLE]\n                \
     [--label TEXT] [--store DIR] [--qr-out FILE]\n  \
     pdf_seal verify <document-id> <candidate.pdf> [--store DIR]\n  \
     pdf_seal key-info"
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let Some(command) = args.get(1) else {
        return Err("missing command".to_string());
    };

    let mut positional = Vec::new();
    let mut bits = DEFAULT_KEY_BITS;
    let mut out_dir = PathBuf::from("keys");
    let mut output = None;
    let mut issuer = String::from("PDF Seal");
    let mut title = None;
    let mut label = None;
    let mut store = PathBuf::from(DEFAULT_STORE_DIR);
    let mut qr_out = None;

    let mut i = 2;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i).cloned().ok_or_else(|| format!("{} needs a value", flag))
        };
        match flag {
            "--bits" => {
                let raw = value()?;
                bits = raw.parse().map_err(|_| format!("invalid --bits value: {}", raw))?;
            },
            "--out-dir" => out_dir = PathBuf::from(value()?),
            "--out" | "-o" => output = Some(PathBuf::from(value()?)),
            "--issuer" => issuer = value()?,
            "--title" => title = Some(value()?),
            "--label" => label = Some(value()?),
            "--store" => store = PathBuf::from(value()?),
            "--qr-out" => qr_out = Some(PathBuf::from(value()?)),
            other if other.starts_with("--") => return Err(format!("unknown option {}", other)),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    match command.as_str() {
        "keygen" => Ok(Command::Keygen { bits, out_dir }),
        "sign" => {
            let [input] = positional.as_slice() else {
                return Err("sign takes exactly one input file".to_string());
            };
            let output = output.ok_or("sign requires --out")?;
            Ok(Command::Sign {
                input: PathBuf::from(input),
                output,
                issuer,
                title,
                label,
                store,
                qr_out,
            })
        },
        "verify" => {
            let [document_id, candidate] = positional.as_slice() else {
                return Err("verify takes a document id and a candidate file".to_string());
            };
            Ok(Command::Verify {
                document_id: document_id.clone(),
                candidate: PathBuf::from(candidate),
                store,
            })
        },
        "key-info" => Ok(Command::KeyInfo),
        other => Err(format!("unknown command {}", other)),
    }
}

/// Load keys as configured, honouring `abort_on_key_failure`.
fn load_key_manager(config: &SealConfig) -> Result<Arc<KeyManager>, Error> {
    match KeyManager::from_config(config) {
        Ok(keys) => Ok(Arc::new(keys)),
        Err(e) if !config.abort_on_key_failure => {
            log::warn!("Continuing without a signing key: {}", e);
            Ok(Arc::new(KeyManager::with_min_bits(config.min_key_bits)))
        },
        Err(e) => Err(e),
    }
}

fn open_notary(config: SealConfig, store_dir: &Path) -> Result<Notary, Error> {
    let keys = load_key_manager(&config)?;
    let store = Arc::new(JsonFileStore::open(store_dir)?);
    let notary = Notary::new(keys, store, config)?;
    if notary.rotation_due() {
        log::warn!("Signing key is older than the configured maximum age; rotate it");
    }
    Ok(notary)
}

fn keygen(bits: usize, out_dir: &Path) -> Result<ExitCode, Error> {
    let generated = KeyManager::generate_new_key_pair(bits)?;
    let (private_path, public_path) = write_key_files(&generated, out_dir)?;

    println!("Generated {}-bit key {}", generated.bits, generated.key_id);
    println!("  private: {}", private_path.display());
    println!("  public:  {}", public_path.display());
    Ok(ExitCode::SUCCESS)
}

#[allow(clippy::too_many_arguments)]
fn sign(
    config: SealConfig,
    input: &Path,
    output: &Path,
    issuer: &str,
    title: Option<&str>,
    label: Option<String>,
    store: &Path,
    qr_out: Option<&Path>,
) -> Result<ExitCode, Error> {
    let notary = open_notary(config, store)?;
    let bytes = fs::read(input)?;
    let title = title.map(str::to_string).unwrap_or_else(|| {
        input
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    });

    let mut request = SignRequest::new().with_issuer(issuer);
    if let Some(label) = label {
        request = request.with_label(label);
    }
    let signed = notary.sign_pdf_with(&bytes, &title, request)?;

    fs::write(output, &signed.signed_bytes)?;
    if let Some(qr_out) = qr_out {
        fs::write(qr_out, &signed.qr_png)?;
    }

    println!("Document id: {}", signed.document_id);
    println!("Hash:        {}", signed.hash.to_hex());
    println!("Key id:      {}", signed.signature.key_id);
    println!("Pages:       {}", signed.page_count);
    println!("Written to   {}", output.display());
    Ok(ExitCode::SUCCESS)
}

fn verify(
    config: SealConfig,
    document_id: &str,
    candidate: &Path,
    store: &Path,
) -> Result<ExitCode, Error> {
    let notary = open_notary(config, store)?;
    let bytes = fs::read(candidate)?;
    let result = notary.verify_pdf(document_id, &bytes)?;

    println!("{}: {}", result.status, result.message);
    println!("  original hash: {}", result.original_hash.to_hex());
    println!("  uploaded hash: {}", result.uploaded_hash.to_hex());

    Ok(match result.status {
        VerificationStatus::Valid => ExitCode::SUCCESS,
        VerificationStatus::Modified => ExitCode::from(2),
        _ => ExitCode::from(3),
    })
}

fn key_info(config: SealConfig) -> Result<ExitCode, Error> {
    let keys = load_key_manager(&config)?;
    let pair = match keys.current() {
        Ok(pair) => pair,
        Err(e) => {
            println!("No signing key installed: {}", e);
            return Ok(ExitCode::from(1));
        },
    };

    println!("Key id:     {}", pair.key_id());
    println!("Algorithm:  {} ({} bits)", pair.algorithm(), pair.bits());
    println!("Loaded at:  {}", pair.created_at().to_rfc3339());
    if keys.should_rotate_key(config.key_max_age) {
        println!("Rotation:   due");
    } else {
        println!("Rotation:   not due");
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, usage());
            return ExitCode::from(1);
        },
    };

    let config = match SealConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        },
    };

    let outcome = match command {
        Command::Keygen { bits, out_dir } => keygen(bits, &out_dir),
        Command::Sign {
            input,
            output,
            issuer,
            title,
            label,
            store,
            qr_out,
        } => sign(
            config,
            &input,
            &output,
            &issuer,
            title.as_deref(),
            label,
            &store,
            qr_out.as_deref(),
        ),
        Command::Verify {
            document_id,
            candidate,
            store,
        } => verify(config, &document_id, &candidate, &store),
        Command::KeyInfo => key_info(config),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        },
    }
}
