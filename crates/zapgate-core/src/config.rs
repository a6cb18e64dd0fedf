use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::Result;

/// Typed configuration for the gateway.
///
/// Everything comes from environment variables (with a `.env` file honored
/// when present) and falls back to the defaults the service has always used.
#[derive(Clone, Debug)]
pub struct Config {
    // HTTP edge
    pub host: String,
    pub port: u16,

    // Session persistence
    pub session_file: PathBuf,

    // Fixed server-side image sent by the image route
    pub image_file: PathBuf,

    // Automation sidecar
    pub bridge_program: PathBuf,
    pub bridge_args: Vec<String>,

    // Observer-facing status strings
    pub status: StatusMessages,
}

/// Human-readable connection status strings pushed to observers.
#[derive(Clone, Debug)]
pub struct StatusMessages {
    pub connecting: String,
    pub qr_received: String,
    pub authenticated: String,
    pub ready: String,
    pub disconnected: String,
}

impl Default for StatusMessages {
    fn default() -> Self {
        Self {
            connecting: "Conectando...".to_string(),
            qr_received: "QR code recebido. Escaneie por favor!".to_string(),
            authenticated: "Autenticado!".to_string(),
            ready: "Whatsapp está pronto!".to_string(),
            disconnected: "Desconectado.".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let host = env_str("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = env_u16("PORT").unwrap_or(8000);

        let session_file =
            env_path("SESSION_FILE").unwrap_or_else(|| PathBuf::from("./whatsapp-session.json"));
        let image_file = env_path("IMAGE_FILE").unwrap_or_else(|| PathBuf::from("./imagem.png"));

        // Ensure the session file's directory exists so the first save after
        // pairing does not fail on a missing parent.
        if let Some(parent) = session_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bridge_program =
            env_path("BRIDGE_CMD").unwrap_or_else(|| PathBuf::from("whatsapp-web-bridge"));
        let bridge_args = parse_csv(env_str("BRIDGE_ARGS"));

        Ok(Self {
            host,
            port,
            session_file,
            image_file,
            bridge_program,
            bridge_args,
            status: StatusMessages::default(),
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u16(key: &str) -> Option<u16> {
    env_str(key).and_then(|s| s.trim().parse::<u16>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
