use rgenai_batch::{
    logger::{self, LogLevel, LoggerConfig},
    BatchWorker, GenerationRequest, GeneratorConfig, PollinationsClient, SizePreset, WorkerEvent,
    BUILTIN_MODELS,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn preset_from_env() -> Option<SizePreset> {
    let name = env::var("GEN_PRESET").ok()?;
    let preset: SizePreset = serde_json::from_value(serde_json::Value::String(name.clone())).ok()?;
    log::info!("📐 Using size preset: {}", preset.label());
    Some(preset)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let level = env::var("LOG_LEVEL")
        .ok()
        .and_then(|name| LogLevel::parse(&name))
        .unwrap_or(LogLevel::Info);
    logger::init_with_config(LoggerConfig::development().with_level(level))?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    let config = GeneratorConfig::from_env();
    logger::log_config_info(&config);
    let client = PollinationsClient::new(&config)?;

    if env::var("GEN_LIST_MODELS").map_or(false, |v| v == "true") {
        match client.list_models().await {
            Ok(models) => {
                log::info!("📚 Available remote models:");
                for model in models {
                    log::info!("  🔗 {}", model);
                }
            }
            Err(e) => log::error!("❌ Failed to load models: {}", e),
        }
        return Ok(());
    }

    let models: Vec<String> = match env::var("GEN_MODELS") {
        Ok(list) => list
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from)
            .collect(),
        Err(_) => vec![BUILTIN_MODELS[0].to_string()],
    };
    let output_dir = env::var("GEN_OUTPUT_DIR").map(PathBuf::from).unwrap_or_default();

    let mut request = GenerationRequest::new(env::var("GEN_PROMPT").unwrap_or_default(), output_dir)
        .with_models(models)
        .with_size(env_u32("GEN_WIDTH", 1024), env_u32("GEN_HEIGHT", 1024))
        .with_repetitions(env_u32("GEN_COUNT", 1));
    if let Some(preset) = preset_from_env() {
        request = request.with_preset(preset);
    }

    if let Err(e) = request.validate() {
        log::error!("❌ {}", e);
        return Err(e.into());
    }

    let mut handle = BatchWorker::new(request, Arc::new(client)).spawn();
    let stop = handle.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("🛑 Ctrl-C received, stopping after the current image");
            stop.stop();
        }
    });

    while let Some(event) = handle.recv().await {
        match event {
            WorkerEvent::Progress(percent) if percent < 100 => {
                log::info!("🎨 Generating... {}%", percent)
            }
            WorkerEvent::Progress(_) => log::info!("✅ Done!"),
            WorkerEvent::ImageSaved(path) => log::info!("🖼️  {}", path.display()),
            WorkerEvent::Error(message) => log::error!("❌ {}", message),
            WorkerEvent::Finished(result) => {
                logger::log_run_summary(&result);
                break;
            }
        }
    }

    Ok(())
}
