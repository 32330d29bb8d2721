use std::{sync::Arc, time::Instant};

use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Form, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use txt2img_core::{
    encode_png, GenerateError, GenerationOptions, LoadError, ModelConfig, Offloading,
    TextToImageModel, TokenSource,
};

const DEFAULT_MODEL_ID: &str = "black-forest-labs/FLUX.1-schnell";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3861;
const DEFAULT_PROMPT: &str = "A fantasy landscape with castles and waterfalls";

#[derive(Parser)]
struct Args {
    /// Model ID (local path or Hugging Face model ID)
    #[arg(long, default_value = DEFAULT_MODEL_ID)]
    model_id: String,

    /// Model ID to source the transformer from, e.g. a quantized variant
    #[arg(long)]
    transformer_model_id: Option<String>,

    /// Hugging Face token. Useful for accessing gated repositories.
    /// By default, the Hugging Face token at ~/.cache/huggingface/token is used.
    #[arg(long)]
    token: Option<String>,

    /// Model revision to use
    #[arg(long)]
    revision: Option<String>,

    /// Offloading setting to use for this model
    #[arg(short, long)]
    offloading: Option<Offloading>,

    /// The host to serve on
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// The port to serve on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Number of denoising steps. A higher number of steps often means higher quality.
    #[arg(short, long, default_value_t = 4)]
    num_steps: usize,

    /// Guidance scale to use. This is model specific.
    #[arg(short, long, default_value_t = 0.0)]
    scale: f64,

    /// Height of the generated images
    #[arg(long, default_value_t = 720)]
    height: usize,

    /// Width of the generated images
    #[arg(long, default_value_t = 1280)]
    width: usize,
}

struct AppState {
    /// Populated on the first generate request, then reused for the process
    /// lifetime.
    model: Mutex<Option<TextToImageModel>>,
    model_id: String,
    transformer_model_id: Option<String>,
    token: Option<String>,
    revision: Option<String>,
    offloading: Option<Offloading>,
    options: GenerationOptions,
}

impl AppState {
    fn model_config(&self) -> ModelConfig {
        let mut config = ModelConfig::new(&self.model_id);
        config.transformer_model_id = self.transformer_model_id.clone();
        config.revision = self.revision.clone();
        config.offloading = self.offloading.clone();
        if let Some(token) = &self.token {
            config.token = TokenSource::Literal(token.clone());
        }
        config
    }
}

#[derive(Deserialize)]
struct GenerateForm {
    prompt: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state = Arc::new(AppState {
        model: Mutex::new(None),
        model_id: args.model_id,
        transformer_model_id: args.transformer_model_id,
        token: args.token,
        revision: args.revision,
        offloading: args.offloading,
        options: GenerationOptions {
            height: args.height,
            width: args.width,
            num_steps: args.num_steps,
            guidance_scale: args.scale,
        },
    });

    let app = Router::new()
        .route("/", get(index))
        .route("/generate", post(generate))
        .route("/health", get(|| async { "ok" }))
        .with_state(state);

    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!("Listening on {addr}");
    tracing::info!("The pipeline will be loaded on the first generate request");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn index() -> Html<String> {
    Html(render_page(DEFAULT_PROMPT, None))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Form(form): Form<GenerateForm>,
) -> Result<Html<String>, (StatusCode, String)> {
    let mut guard = state.model.lock().await;

    if guard.is_none() {
        tracing::info!("First generate request: loading the pipeline");
        let model = state.model_config().load().map_err(reject_load)?;
        *guard = Some(model);
    }
    let Some(model) = guard.as_ref() else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "pipeline not loaded".to_string(),
        ));
    };

    let start = Instant::now();
    let image = model
        .generate(&form.prompt, &state.options)
        .map_err(reject)?;
    let elapsed = start.elapsed().as_secs_f32();

    let png = encode_png(&image).map_err(reject)?;

    Ok(Html(render_page(&form.prompt, Some((&png, elapsed)))))
}

fn reject(err: GenerateError) -> (StatusCode, String) {
    let status = match err {
        GenerateError::EmptyPrompt | GenerateError::InvalidDimensions => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn reject_load(err: LoadError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

fn render_page(prompt: &str, result: Option<(&[u8], f32)>) -> String {
    let prompt = escape_html(prompt);
    let result_block = match result {
        Some((png, elapsed)) => format!(
            "<p><img src=\"data:image/png;base64,{}\" alt=\"generated image\" style=\"max-width: 100%;\"></p>\n\
             <p><em>Generated in {elapsed:.2}s</em></p>\n",
            STANDARD.encode(png)
        ),
        None => String::new(),
    };

    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><title>Text-to-Image Studio</title></head>\n\
         <body>\n\
         <h1>Text-to-Image Studio</h1>\n\
         <p>Generate images with a pretrained diffusion pipeline.</p>\n\
         <form method=\"post\" action=\"/generate\">\n\
         <textarea name=\"prompt\" rows=\"2\" cols=\"60\">{prompt}</textarea>\n\
         <br>\n\
         <button type=\"submit\">Generate</button>\n\
         </form>\n\
         {result_block}\
         </body>\n\
         </html>\n"
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_page_has_default_prompt() {
        let page = render_page(DEFAULT_PROMPT, None);
        assert!(page.contains(">A fantasy landscape with castles and waterfalls</textarea>"));
        assert!(page.contains("<h1>Text-to-Image Studio</h1>"));
        assert!(!page.contains("<img"));
    }

    #[test]
    fn result_page_has_image_and_caption() {
        let page = render_page("a sunrise", Some((&[1, 2, 3], 1.5)));
        assert!(page.contains("data:image/png;base64,AQID"));
        assert!(page.contains("Generated in 1.50s"));
    }

    #[test]
    fn prompt_is_escaped() {
        let page = render_page("<b>&\"bold\"</b>", None);
        assert!(page.contains("&lt;b&gt;&amp;&quot;bold&quot;&lt;/b&gt;"));
    }

    #[test]
    fn load_errors_are_internal() {
        let (status, _) = reject_load(LoadError::Pipeline(anyhow::anyhow!("no weights")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
