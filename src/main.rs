use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};

use hwpx_cert_editor::config::{
    init_default_config, resolve_config, CONFIG_ENV_VAR, DEFAULT_CONFIG_FILENAME,
};
use hwpx_cert_editor::fields::{CertificateFields, SavedResponseExtractor};
use hwpx_cert_editor::hwpx::{rebuild_archive, HwpxPackage, RebuildContext};
use hwpx_cert_editor::progress::ConsoleProgress;
use hwpx_cert_editor::session::{EditSession, VerificationState};
use hwpx_cert_editor::verify::VerificationOutcome;

#[derive(Parser, Debug)]
#[command(name = "hwpx-cert-editor")]
#[command(about = "Edit the fields of a 해촉증명서 HWPX certificate in place", long_about = None)]
struct Args {
    /// Write the default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input .hwpx template
    #[arg(value_name = "HWPX")]
    input: Option<PathBuf>,

    /// Output .hwpx (default: <prefix>_<applicant>.hwpx next to the input)
    #[arg(short, long, value_name = "HWPX")]
    output: Option<PathBuf>,

    /// Config file path (default: search for hwpx-cert-editor.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extraction response JSON for the template (the original field values)
    #[arg(long, value_name = "JSON")]
    original_fields: Option<PathBuf>,

    /// Edited field values JSON (same shape; only editable fields are applied)
    #[arg(long, value_name = "JSON")]
    fields: Option<PathBuf>,

    /// Identity registry response JSON ({success, addressMatch, dbAddress, message})
    #[arg(long, value_name = "JSON")]
    verify_response: Option<PathBuf>,

    /// On an address mismatch, take the registry's address and continue
    #[arg(long)]
    accept_registry_address: bool,

    /// Keep the template's issue date instead of today's date (KST)
    #[arg(long)]
    keep_issue_date: bool,

    /// Print the registry request JSON for the edited fields, then exit
    #[arg(long)]
    print_verify_request: bool,

    /// Write the primary section XML (for the field extractor), then exit
    #[arg(long, value_name = "XML")]
    dump_section: Option<PathBuf>,

    /// Only parse + re-serialize every section (no edits)
    #[arg(long)]
    roundtrip_only: bool,

    /// No progress output on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let input = match args.input {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  hwpx-cert-editor <template.hwpx> --original-fields orig.json --fields edited.json --verify-response resp.json\n\nTIPS:\n  - Default config search: {DEFAULT_CONFIG_FILENAME} (upwards), or set {CONFIG_ENV_VAR}.\n"
            );
            return Ok(());
        }
    };

    let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let (cfg, cfg_path) = resolve_config(args.config.clone(), &workdir).context("load config")?;
    match cfg_path.as_ref() {
        Some(p) => progress.info(format!("config: {}", p.display())),
        None => progress.info("config: built-in defaults"),
    }

    let package = Arc::new(HwpxPackage::read(&input)?);
    progress.info(format!(
        "{}: {} entries, {} section(s)",
        input.display(),
        package.entries.len(),
        package.section_entries().len()
    ));

    if let Some(xml_out) = args.dump_section.as_ref() {
        let section = package
            .primary_section()
            .context("no Contents/section<N>.xml entry in archive")?;
        std::fs::write(xml_out, &section.data)
            .with_context(|| format!("write section xml: {}", xml_out.display()))?;
        progress.info(format!("wrote {} -> {}", section.name, xml_out.display()));
        return Ok(());
    }

    if args.roundtrip_only {
        let output = args.output.clone().unwrap_or_else(|| {
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output")
                .to_string();
            input.with_file_name(format!("{stem}_roundtrip.hwpx"))
        });
        let ctx = RebuildContext {
            edits: &[],
            company_address: "",
            layout: &cfg.layout,
        };
        let bytes = rebuild_archive(&package, &ctx, &progress)?;
        std::fs::write(&output, bytes)
            .with_context(|| format!("write hwpx: {}", output.display()))?;
        progress.info(format!("wrote {}", output.display()));
        return Ok(());
    }

    let original_fields = args
        .original_fields
        .clone()
        .context("missing --original-fields (extraction response JSON)")?;
    let extractor = SavedResponseExtractor {
        path: original_fields,
    };
    let mut session = EditSession::open(
        Arc::clone(&package),
        &extractor,
        cfg.download.require_verification,
    )?;

    if let Some(p) = args.fields.as_ref() {
        let edited = CertificateFields::from_json_path(p)?;
        session.apply_fields(&edited);
    }
    if args.keep_issue_date {
        session.keep_extracted_issue_date();
    }
    for edit in session.edits().iter().filter(|e| e.is_effective()) {
        progress.info(format!(
            "{}: {:?} -> {:?}",
            edit.key.label(),
            edit.original,
            edit.current
        ));
    }

    if args.print_verify_request {
        println!("{}", session.verification_request().to_json()?);
        return Ok(());
    }

    if let Some(p) = args.verify_response.as_ref() {
        let text = std::fs::read_to_string(p)
            .with_context(|| format!("read verify response: {}", p.display()))?;
        let outcome = VerificationOutcome::from_json_str(&text)?;
        session.apply_verification(&outcome);
        match session.verification().clone() {
            VerificationState::Verified => progress.info("identity verified"),
            VerificationState::AddressMismatch { registry_address } => {
                progress.warn(format!("address differs from registry: {registry_address:?}"));
                if args.accept_registry_address && session.accept_registry_address() {
                    progress.info("registry address accepted");
                }
            }
            VerificationState::NotFound { message } => {
                progress.warn(format!("identity not found: {message}"))
            }
            VerificationState::Unverified => {}
        }
    }

    let download = session.download(&cfg.layout, &cfg.download, &progress)?;
    let output = match args.output {
        Some(p) => p,
        None => input.with_file_name(&download.filename),
    };
    std::fs::write(&output, &download.bytes)
        .with_context(|| format!("write hwpx: {}", output.display()))?;
    progress.info(format!("wrote {}", output.display()));
    Ok(())
}
