//! Interface de linha de comando do noteforge baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, scan, config)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;

/// noteforge: reescreve pastas de imagens e texto em notas prontas para publicar.
#[derive(Debug, Parser)]
#[command(name = "noteforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração TOML.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Processa todas as pastas pendentes do diretório de entrada.
    Run {
        /// Diretório com as pastas de origem.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Diretório onde os pacotes gerados são gravados.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Diretório para onde as pastas concluídas são movidas.
        #[arg(long)]
        processed: Option<PathBuf>,

        /// Pausa entre pastas, em segundos.
        #[arg(long)]
        delay: Option<f64>,

        /// Tentativas por provedor antes de passar ao próximo.
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Lista as pastas válidas e ignoradas sem chamar nenhum modelo.
    Scan {
        /// Diretório com as pastas de origem.
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Mostra a configuração efetiva.
    Config,
}

impl Command {
    /// Aplica as flags da linha de comando por cima da configuração carregada.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        match self {
            Command::Run {
                input,
                output,
                processed,
                delay,
                max_attempts,
            } => {
                if let Some(input) = input {
                    config.paths.input_dir = input.clone();
                }
                if let Some(output) = output {
                    config.paths.output_dir = output.clone();
                }
                if let Some(processed) = processed {
                    config.paths.processed_dir = processed.clone();
                }
                if let Some(delay) = delay {
                    config.folder_delay_secs = *delay;
                }
                if let Some(max) = max_attempts {
                    config.retry.max_attempts = *max;
                }
            }
            Command::Scan { input } => {
                if let Some(input) = input {
                    config.paths.input_dir = input.clone();
                }
            }
            Command::Config => {}
        }
    }
}
