//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `VOYA__*` 覆盖（双下划线表示嵌套，
//! 如 `VOYA__SERVER__PORT=9000`、`VOYA__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub providers: ProvidersSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
}

/// [app] 段：应用名、监督循环步数上界、单次委派超时
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 单次请求内最大推理/委派周期数，防止失控循环
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// 单次委派调用超时（秒）
    #[serde(default = "default_delegation_timeout_secs")]
    pub delegation_timeout_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_steps: default_max_steps(),
            delegation_timeout_secs: default_delegation_timeout_secs(),
        }
    }
}

fn default_max_steps() -> u32 {
    15
}

fn default_delegation_timeout_secs() -> u64 {
    30
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    /// 后端：openai / mock；无 API Key 时自动退到 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// [providers] 段：各外部协作方
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProvidersSection {
    #[serde(default)]
    pub amadeus: AmadeusSection,
    #[serde(default)]
    pub itinerary: EndpointSection,
    #[serde(default)]
    pub profile: EndpointSection,
}

/// [providers.amadeus] 段：凭据走环境变量覆盖，不进 TOML
#[derive(Debug, Clone, Deserialize)]
pub struct AmadeusSection {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    #[serde(default = "default_amadeus_token_url")]
    pub token_url: String,
    #[serde(default = "default_amadeus_base_url")]
    pub base_url: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AmadeusSection {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            token_url: default_amadeus_token_url(),
            base_url: default_amadeus_base_url(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_amadeus_token_url() -> String {
    "https://test.api.amadeus.com/v1/security/oauth2/token".to_string()
}

fn default_amadeus_base_url() -> String {
    "https://test.api.amadeus.com".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    15
}

/// 简单端点配置（行程服务、画像服务）
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSection {
    pub base_url: Option<String>,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EndpointSection {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// [auth] 段：Auth0 域名；未配置时保护路由返回 401
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthSection {
    pub auth0_domain: Option<String>,
}

/// [server] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

/// [storage] 段：检查点 SQLite 路径，未设置时用内存存储
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageSection {
    pub db_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            providers: ProvidersSection::default(),
            auth: AuthSection::default(),
            server: ServerSection::default(),
            storage: StorageSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 VOYA__* 可覆盖
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("VOYA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_steps, 15);
        assert_eq!(cfg.server.port, 8000);
        assert!(cfg.storage.db_path.is_none());
        assert!(cfg.providers.amadeus.token_url.contains("amadeus"));
    }
}
