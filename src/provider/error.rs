//! Tipos de erro para os provedores de modelos de linguagem.
//!
//! Define [`ProviderError`] com variantes para rate limiting, erros HTTP,
//! falhas de rede e respostas malformadas. A classificação em transitório
//! ou permanente é feita por [`ProviderError::is_transient`].

use thiserror::Error;

/// Erros que podem ocorrer ao enviar uma tarefa para um provedor.
///
/// Transitórios (retentáveis): rede, timeout, HTTP 408/429/5xx, corpo
/// malformado ou vazio. Permanentes: HTTP 401/403, demais 4xx e falhas
/// na construção do cliente.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// O servidor retornou HTTP 429.
    #[error("rate limited (retry-after: {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Erro do lado do servidor (5xx) ou 408.
    #[error("provider unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// Credenciais rejeitadas (401/403).
    #[error("unauthorized (status {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// Requisição rejeitada como inválida (demais 4xx).
    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// O pedido excedeu o timeout do cliente HTTP.
    #[error("request timed out")]
    Timeout,

    /// Falha de rede subjacente (DNS, conexão recusada, reset).
    #[error("network error: {0}")]
    Network(String),

    /// Corpo de resposta que não pôde ser interpretado.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Resposta sem nenhum texto gerado.
    #[error("provider returned no content")]
    EmptyResponse,

    /// O cliente não pôde ser construído (URL ou cabeçalho inválido).
    #[error("invalid provider setup: {0}")]
    Setup(String),
}

impl ProviderError {
    /// Classify an HTTP error status into the matching variant.
    pub fn from_status(status: u16, message: String, retry_after_secs: Option<u64>) -> Self {
        match status {
            429 => ProviderError::RateLimited { retry_after_secs },
            401 | 403 => ProviderError::Unauthorized { status, message },
            408 | 500..=599 => ProviderError::Unavailable { status, message },
            _ => ProviderError::Rejected { status, message },
        }
    }

    /// Whether another attempt against the same provider may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Unavailable { .. }
            | ProviderError::Timeout
            | ProviderError::Network(_)
            | ProviderError::Malformed(_)
            | ProviderError::EmptyResponse => true,
            ProviderError::Unauthorized { .. }
            | ProviderError::Rejected { .. }
            | ProviderError::Setup(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_builder() {
            ProviderError::Setup(err.to_string())
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}
