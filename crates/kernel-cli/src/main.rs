use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use kernel_api::{load_or_generate_signing_key, load_verify_key, ConstructApi};
use kernel_core::wave;
use kernel_core::{seal_payload, WhisperPatternRegistry};

const DEFAULT_SIGNING_KEY: &str = "state/signing_key.ed25519";
const DEFAULT_VERIFY_KEY: &str = "state/signing_key.ed25519.pub";
const DEFAULT_RUN_LOG: &str = "state/construct_state.jsonl";

fn print_usage() {
    println!("construct-cli <command>");
    println!("commands:");
    println!("  seal <payload.json> [--signing-key <path>] [--output <path>]");
    println!("    wrap a payload file in a signed envelope (key generated if missing)");
    println!("  run [--demo | --payload <path> | --envelope <path>]");
    println!("      [--verify-key <path>] [--log <path>] [--as-json]");
    println!("    step the construct once and append the record to the run log");
    println!("    default verify key: {DEFAULT_VERIFY_KEY}");
    println!("    default log: {DEFAULT_RUN_LOG}");
    println!("  whisper list [--registry <path>] [--as-json]");
    println!("  whisper demo <inputs.jsonl> [--registry <path>] [--glyph <id>] [--output <path>]");
    println!("    replay pattern selection across a JSONL stream of drift inputs");
    println!("  wave [--entropy <f>] [--phase-offset <f>] [--timestamp <iso>]");
    println!("    print a vertical-wave sample for the demo glyph");
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|index| args.get(index + 1))
        .cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn read_json_file(path: &Path) -> Result<Value, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
    serde_json::from_str(&raw).map_err(|err| format!("invalid JSON in {}: {err}", path.display()))
}

fn handle_seal(args: &[String]) -> Result<(), String> {
    let input = args
        .get(2)
        .filter(|arg| !arg.starts_with("--"))
        .ok_or_else(|| "missing payload path".to_string())?;
    let signing_key_path = flag_value(args, "--signing-key")
        .unwrap_or_else(|| DEFAULT_SIGNING_KEY.to_string());

    let payload = read_json_file(Path::new(input))?;
    let signing_key = load_or_generate_signing_key(Path::new(&signing_key_path))
        .map_err(|err| err.to_string())?;
    let envelope = seal_payload(payload, &signing_key, None, None);
    let encoded = serde_json::to_string(&envelope).map_err(|err| err.to_string())?;

    if let Some(output) = flag_value(args, "--output") {
        let output_path = PathBuf::from(output);
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| err.to_string())?;
            }
        }
        fs::write(&output_path, encoded).map_err(|err| err.to_string())?;
    } else {
        println!("{encoded}");
    }
    Ok(())
}

fn handle_run(args: &[String]) -> Result<(), String> {
    let demo = has_flag(args, "--demo");
    let payload_path = flag_value(args, "--payload");
    let envelope_path = flag_value(args, "--envelope");
    let chosen = [demo, payload_path.is_some(), envelope_path.is_some()]
        .iter()
        .filter(|flag| **flag)
        .count();
    if chosen > 1 {
        return Err("choose exactly one of --demo, --payload, or --envelope".to_string());
    }

    let log_path = flag_value(args, "--log").unwrap_or_else(|| DEFAULT_RUN_LOG.to_string());
    let mut api = ConstructApi::bootstrap()
        .map_err(|err| err.to_string())?
        .attach_run_log(PathBuf::from(log_path));

    let candidate = if demo {
        json!({"input": "demo resonance"})
    } else if let Some(path) = payload_path {
        read_json_file(Path::new(&path))?
    } else if let Some(path) = envelope_path {
        let verify_key_path =
            flag_value(args, "--verify-key").unwrap_or_else(|| DEFAULT_VERIFY_KEY.to_string());
        let verify_key =
            load_verify_key(Path::new(&verify_key_path)).map_err(|err| err.to_string())?;
        api = api.with_verify_key(verify_key).require_signature(true);
        read_json_file(Path::new(&path))?
    } else {
        json!({})
    };

    let outcome = api.run_once_value(&candidate).map_err(|err| err.to_string())?;

    let encoded = if has_flag(args, "--as-json") {
        serde_json::to_string(&outcome.state)
    } else {
        serde_json::to_string_pretty(&outcome.state)
    }
    .map_err(|err| err.to_string())?;
    println!("{encoded}");
    Ok(())
}

fn load_registry(args: &[String]) -> Result<WhisperPatternRegistry, String> {
    match flag_value(args, "--registry") {
        Some(path) => {
            WhisperPatternRegistry::from_file(Path::new(&path)).map_err(|err| err.to_string())
        }
        None => kernel_core::defaults::demo_registry().map_err(|err| err.to_string()),
    }
}

fn handle_whisper_list(args: &[String]) -> Result<(), String> {
    let registry = load_registry(args)?;

    if has_flag(args, "--as-json") {
        let encoded =
            serde_json::to_string_pretty(registry.patterns()).map_err(|err| err.to_string())?;
        println!("{encoded}");
        return Ok(());
    }

    for pattern in registry.patterns() {
        let mut summary = format!("{} ({})", pattern.id, pattern.glyph_id);
        if let Some(description) = &pattern.description {
            summary.push_str(": ");
            summary.push_str(description);
        }
        println!("{summary}");
    }
    Ok(())
}

fn parse_demo_timestamp(entry: &Value) -> Option<DateTime<Utc>> {
    entry
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|raw| contracts::parse_iso_timestamp(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn handle_whisper_demo(args: &[String]) -> Result<(), String> {
    let inputs = args
        .get(3)
        .filter(|arg| !arg.starts_with("--"))
        .ok_or_else(|| "missing inputs path".to_string())?;
    let glyph_override = flag_value(args, "--glyph");

    let mut runtime = load_registry(args)?.runtime();

    let raw = fs::read_to_string(inputs).map_err(|err| format!("cannot read {inputs}: {err}"))?;
    let mut traces = Vec::new();
    for (index, line) in raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
    {
        let entry: Value =
            serde_json::from_str(line).map_err(|err| format!("line {}: {err}", index + 1))?;

        let drift = entry.get("drift").and_then(Value::as_f64);
        let glyph = entry
            .get("glyph_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| glyph_override.clone());
        let counter = entry
            .get("counter")
            .and_then(Value::as_u64)
            .unwrap_or(index as u64);
        let tags: std::collections::BTreeSet<String> = entry
            .get("tags")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let selection = runtime.select(
            drift,
            &tags,
            glyph.as_deref(),
            Some(counter),
            parse_demo_timestamp(&entry),
            true,
        );

        let selected = match &selection {
            Some(pattern) => {
                let status = runtime.status(&pattern.id).map_err(|err| err.to_string())?;
                json!({"pattern": pattern, "status": status})
            }
            None => Value::Null,
        };
        traces.push(json!({
            "index": index,
            "input": entry,
            "glyph_id": glyph,
            "selected": selected,
        }));
    }

    let encoded: Vec<String> = traces
        .iter()
        .map(|trace| serde_json::to_string(trace).map_err(|err| err.to_string()))
        .collect::<Result<_, _>>()?;

    if let Some(output) = flag_value(args, "--output") {
        let output_path = PathBuf::from(output);
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| err.to_string())?;
            }
        }
        fs::write(&output_path, encoded.join("\n") + "\n").map_err(|err| err.to_string())?;
    } else {
        for line in encoded {
            println!("{line}");
        }
    }
    Ok(())
}

fn handle_wave(args: &[String]) -> Result<(), String> {
    let entropy = match flag_value(args, "--entropy") {
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|_| format!("invalid entropy: {raw}"))?,
        None => 0.5,
    };
    let phase_offset = match flag_value(args, "--phase-offset") {
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|_| format!("invalid phase offset: {raw}"))?,
        None => 0.0,
    };
    let timestamp = match flag_value(args, "--timestamp") {
        Some(raw) => contracts::parse_iso_timestamp(&raw)
            .map_err(|err| err.to_string())?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let amplitude = kernel_core::bloom::bloom_probability(
        0.0,
        timestamp,
        kernel_core::bloom::chaos_from_glyph(kernel_core::defaults::DEMO_GLYPH_ID),
        kernel_core::bloom::BLOOM_WAVE_FREQUENCY,
        kernel_core::bloom::phase_from_glyph(kernel_core::defaults::DEMO_GLYPH_ID),
    );
    let sample = wave::VerticalWaveSample {
        season_phase: wave::normalize_season_phase(timestamp, phase_offset, entropy),
        zodiac_phase: wave::normalize_zodiac_phase(timestamp, phase_offset, entropy),
        lunar_phase: wave::normalize_lunar_phase(timestamp, entropy),
        entropy_phase: wave::wrap_unit(entropy * 0.85),
        base_amplitude: amplitude,
        user_modulated_amp: amplitude,
        insight_spike: false,
        insight_intensity: 0.0,
        sinth_signature: kernel_core::defaults::DEMO_GLYPH_ID.to_string(),
        sinth_tempo: kernel_core::bloom::BLOOM_WAVE_FREQUENCY,
    };

    let encoded = serde_json::to_string_pretty(&sample).map_err(|err| err.to_string())?;
    println!("{encoded}");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let result = match command {
        Some("seal") => handle_seal(&args),
        Some("run") => handle_run(&args),
        Some("wave") => handle_wave(&args),
        Some("whisper") => match args.get(2).map(String::as_str) {
            Some("list") => handle_whisper_list(&args),
            Some("demo") => handle_whisper_demo(&args),
            _ => {
                print_usage();
                std::process::exit(2);
            }
        },
        _ => {
            print_usage();
            return;
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        print_usage();
        std::process::exit(2);
    }
}
