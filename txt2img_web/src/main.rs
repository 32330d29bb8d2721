use std::sync::Arc;

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
    encode_png, GenerateError, GenerationOptions, ModelConfig, Offloading, TextToImageModel,
    TokenSource,
};

const DEFAULT_MODEL_ID: &str = "black-forest-labs/FLUX.1-schnell";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3860;

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
    model: Mutex<TextToImageModel>,
    options: GenerationOptions,
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

    let mut config = ModelConfig::new(&args.model_id);
    config.transformer_model_id = args.transformer_model_id;
    config.revision = args.revision;
    config.offloading = args.offloading;
    if let Some(token) = args.token {
        config.token = TokenSource::Literal(token);
    }

    // Load failure is fatal: the server never starts without a pipeline.
    let model = config.load()?;

    let state = Arc::new(AppState {
        model: Mutex::new(model),
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

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn index() -> Html<String> {
    Html(render_page(None, None))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Form(form): Form<GenerateForm>,
) -> Result<Html<String>, (StatusCode, String)> {
    let image = {
        let model = state.model.lock().await;
        model
            .generate(&form.prompt, &state.options)
            .map_err(reject)?
    };
    let png = encode_png(&image).map_err(reject)?;

    Ok(Html(render_page(Some(&form.prompt), Some(&png))))
}

fn reject(err: GenerateError) -> (StatusCode, String) {
    let status = match err {
        GenerateError::EmptyPrompt | GenerateError::InvalidDimensions => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn render_page(prompt: Option<&str>, png: Option<&[u8]>) -> String {
    let prompt = prompt.map(escape_html).unwrap_or_default();
    let image_block = match png {
        Some(png) => format!(
            "<p><img src=\"data:image/png;base64,{}\" alt=\"generated image\" style=\"max-width: 100%;\"></p>\n",
            STANDARD.encode(png)
        ),
        None => String::new(),
    };

    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><title>Text-to-Image</title></head>\n\
         <body>\n\
         <form method=\"post\" action=\"/generate\">\n\
         <textarea name=\"prompt\" rows=\"2\" cols=\"60\" placeholder=\"Enter your prompt here...\">{prompt}</textarea>\n\
         <br>\n\
         <button type=\"submit\">Generate</button>\n\
         </form>\n\
         {image_block}\
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
    fn page_without_image_has_no_img_tag() {
        let page = render_page(None, None);
        assert!(page.contains("<form method=\"post\" action=\"/generate\">"));
        assert!(!page.contains("<img"));
    }

    #[test]
    fn page_embeds_image_as_data_uri() {
        let page = render_page(Some("a sunrise"), Some(&[1, 2, 3]));
        assert!(page.contains("data:image/png;base64,AQID"));
        assert!(page.contains(">a sunrise</textarea>"));
    }

    #[test]
    fn prompt_is_escaped() {
        let page = render_page(Some("<script>\"hi\"</script>"), None);
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;&quot;hi&quot;&lt;/script&gt;"));
    }

    #[test]
    fn validation_errors_map_to_bad_request() {
        let (status, _) = reject(GenerateError::EmptyPrompt);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = reject(GenerateError::NoImage);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
