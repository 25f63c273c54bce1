//! Configuração do noteforge carregada a partir de `noteforge.toml`.
//!
//! A struct [`AppConfig`] contém todos os parâmetros configuráveis e é
//! construída uma única vez na inicialização; o resto do programa a recebe
//! por referência. Valores ausentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente de caminhos e de atraso têm precedência sobre
//! o arquivo, e as flags da CLI têm precedência sobre ambas.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Nome do arquivo procurado no diretório atual quando `--config` não é usado.
pub const DEFAULT_CONFIG_FILE: &str = "noteforge.toml";

/// Configuração de nível superior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    /// Pausa em segundos entre uma pasta e a próxima.
    #[serde(default = "default_folder_delay_secs")]
    pub folder_delay_secs: f64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub prompts: PromptConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Diretórios de entrada, saída e de pastas já processadas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,
}

/// Parâmetros de retentativa aplicados a cada provedor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total de tentativas por provedor, incluindo a primeira.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Limite superior (exclusivo) do jitter aleatório em milissegundos.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

/// Regras de reconhecimento das pastas de entrada.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Nome-base do documento dentro de cada pasta (sem extensão).
    #[serde(default = "default_document_stem")]
    pub document_stem: String,
    /// Nomes de subpastas ignoradas pela varredura.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

/// Filtro de cor aplicado às imagens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Contraste e saturação levemente aumentados.
    #[default]
    Natural,
    /// Mais brilho e um toque de vermelho.
    Warm,
}

/// Parâmetros do pipeline de imagens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub filter: FilterKind,
    /// Largura da borda branca em pixels.
    #[serde(default = "default_border_px")]
    pub border_px: u32,
    /// Fração da altura mantida no corte inferior, em milésimos.
    #[serde(default = "default_keep_height_permille")]
    pub keep_height_permille: u32,
}

/// Caminhos opcionais para os templates de prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default)]
    pub rewrite: Option<PathBuf>,
    #[serde(default)]
    pub title: Option<PathBuf>,
}

/// Cadeias de provedores por tipo de tarefa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Cadeia de fallback para reescrita, na ordem de tentativa.
    #[serde(default = "default_rewrite_providers")]
    pub rewrite: Vec<ProviderConfig>,
    /// Provedor único para geração de títulos.
    #[serde(default = "default_title_provider")]
    pub title: ProviderConfig,
}

/// Um endpoint compatível com `chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    /// Variável de ambiente que contém a chave da API.
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Cabeçalhos HTTP extras enviados em cada requisição.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

// Valor padrão para o atraso entre pastas: 5 segundos.
fn default_folder_delay_secs() -> f64 {
    5.0
}

fn default_input_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("新生成文件")
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("已处理文件")
}

// Valor padrão para tentativas por provedor: 3.
fn default_max_attempts() -> u32 {
    3
}

// Valor padrão para o atraso base: 1000ms.
fn default_base_delay_ms() -> u64 {
    1000
}

fn default_jitter_ms() -> u64 {
    500
}

fn default_document_stem() -> String {
    "正文".to_string()
}

fn default_border_px() -> u32 {
    20
}

// Mantém 19/20 da altura.
fn default_keep_height_permille() -> u32 {
    950
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_rewrite_providers() -> Vec<ProviderConfig> {
    let mut openrouter_headers = BTreeMap::new();
    openrouter_headers.insert(
        "HTTP-Referer".to_string(),
        "https://github.com/noteforge/noteforge".to_string(),
    );
    openrouter_headers.insert("X-Title".to_string(), "noteforge".to_string());

    vec![
        ProviderConfig {
            name: "openrouter".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "deepseek/deepseek-r1-0528:free".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            temperature: None,
            timeout_secs: default_timeout_secs(),
            headers: openrouter_headers,
        },
        ProviderConfig {
            name: "siliconflow".to_string(),
            base_url: "https://api.siliconflow.cn/v1".to_string(),
            model: "deepseek-ai/DeepSeek-V3.1".to_string(),
            api_key_env: "SILICONFLOW_API_KEY".to_string(),
            temperature: None,
            timeout_secs: default_timeout_secs(),
            headers: BTreeMap::new(),
        },
    ]
}

fn default_title_provider() -> ProviderConfig {
    ProviderConfig {
        name: "moonshot".to_string(),
        base_url: "https://api.moonshot.cn/v1".to_string(),
        model: "kimi-k2-0711-preview".to_string(),
        api_key_env: "MOONSHOT_API_KEY".to_string(),
        temperature: Some(0.6),
        timeout_secs: default_timeout_secs(),
        headers: BTreeMap::new(),
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
            processed_dir: default_processed_dir(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

// Pastas auxiliares que convivem com as de entrada.
fn default_exclude() -> Vec<String> {
    vec!["__pycache__".to_string(), "配置与提示词".to_string()]
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            document_stem: default_document_stem(),
            exclude: default_exclude(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            filter: FilterKind::default(),
            border_px: default_border_px(),
            keep_height_permille: default_keep_height_permille(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            rewrite: default_rewrite_providers(),
            title: default_title_provider(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            folder_delay_secs: default_folder_delay_secs(),
            retry: RetryConfig::default(),
            scan: ScanConfig::default(),
            image: ImageConfig::default(),
            prompts: PromptConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Lê a chave da API da variável de ambiente configurada.
    pub fn api_key(&self) -> Result<String, AppError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(AppError::MissingApiKey {
                provider: self.name.clone(),
                env: self.api_key_env.clone(),
            }),
        }
    }

    /// Indica se a chave está disponível, sem expô-la.
    pub fn has_api_key(&self) -> bool {
        self.api_key().is_ok()
    }
}

impl AppConfig {
    /// Carrega a configuração de `path`, ou de `noteforge.toml` no diretório atual.
    ///
    /// Um caminho explícito inexistente é erro; o arquivo padrão ausente
    /// resulta nos valores padrão.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(AppError::Config(format!(
                        "config file not found: {}",
                        explicit.display()
                    )));
                }
                Self::from_file(explicit)?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<AppConfig>(&contents)?)
    }

    /// Aplica as variáveis de ambiente sobre os valores do arquivo.
    ///
    /// Um `FOLDER_DELAY_SECONDS` não numérico é ignorado.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = non_empty("INPUT_FOLDER_PATH") {
            self.paths.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("OUTPUT_FOLDER_PATH") {
            self.paths.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("PROCESSED_FOLDER_PATH") {
            self.paths.processed_dir = PathBuf::from(dir);
        }
        if let Some(raw) = non_empty("FOLDER_DELAY_SECONDS") {
            match raw.trim().parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs >= 0.0 => self.folder_delay_secs = secs,
                _ => tracing::warn!(value = %raw, "ignoring invalid FOLDER_DELAY_SECONDS"),
            }
        }
    }

    /// Verifica invariantes que o serde não consegue expressar.
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.folder_delay_secs.is_finite() || self.folder_delay_secs < 0.0 {
            return Err(AppError::Config(format!(
                "folder_delay_secs must be a non-negative number, got {}",
                self.folder_delay_secs
            )));
        }
        if self.providers.rewrite.is_empty() {
            return Err(AppError::Config(
                "providers.rewrite must list at least one provider".into(),
            ));
        }
        if self.image.keep_height_permille == 0 || self.image.keep_height_permille > 1000 {
            return Err(AppError::Config(format!(
                "image.keep_height_permille must be in 1..=1000, got {}",
                self.image.keep_height_permille
            )));
        }
        if self.scan.document_stem.trim().is_empty() {
            return Err(AppError::Config("scan.document_stem must not be empty".into()));
        }
        Ok(())
    }

    /// Atraso entre pastas como [`std::time::Duration`].
    pub fn folder_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.folder_delay_secs)
    }
}
