//! Interface de terminal do noteforge: barra de progresso e saída colorida.
//!
//! Usa as crates `indicatif` para a barra de progresso e `console` para
//! estilização com cores. O [`BatchProgress`] acompanha visualmente
//! a execução de um lote no terminal.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::AppConfig;
use crate::error::FolderError;
use crate::folder::Folder;
use crate::orchestrator::{BatchObserver, CompletedFolder, RunSummary};
use crate::scanner::ScanReport;

/// Indicador visual de progresso para a execução de um lote no terminal.
///
/// Pastas concluídas aparecem em verde, falhas em vermelho e pausas em amarelo.
pub struct BatchProgress {
    // Barra de progresso do indicatif, dimensionada após a varredura.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchProgress {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Remove a barra sem imprimir resumo, usado quando o lote aborta.
    pub fn clear(&self) {
        self.pb.finish_and_clear();
    }

    /// Finaliza a barra e imprime o resumo da execução.
    pub fn finish(&self, summary: &RunSummary) {
        self.pb.finish_and_clear();
        print_summary(summary);
    }
}

impl BatchObserver for BatchProgress {
    fn scan_complete(&self, report: &ScanReport) {
        self.pb.set_length(report.folders.len() as u64);
        for skipped in &report.skipped {
            self.pb.println(format!(
                "  {} {} ignorada: {}",
                self.dim.apply_to("-"),
                skipped.name,
                join(&skipped.problems)
            ));
        }
    }

    fn folder_started(&self, _index: usize, _total: usize, folder: &Folder) {
        self.pb.set_message(folder.name.clone());
    }

    fn folder_finished(&self, folder: &Folder, outcome: &Result<CompletedFolder, FolderError>) {
        match outcome {
            Ok(done) => self.pb.println(format!(
                "  {} {} → {}",
                self.green.apply_to("✓"),
                folder.name,
                done.title
            )),
            Err(err) => self.pb.println(format!(
                "  {} {}: {err}",
                self.red.apply_to("✗"),
                folder.name
            )),
        }
        self.pb.inc(1);
    }

    fn waiting(&self, delay: Duration) {
        let msg = format!("aguardando {:.1}s", delay.as_secs_f64());
        self.pb.set_message(self.yellow.apply_to(msg).to_string());
    }
}

/// Imprime as contagens finais com estilo colorido.
pub fn print_summary(summary: &RunSummary) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let yellow = Style::new().yellow();

    println!();
    println!(
        "{} concluídas, {} com falha, {} ignoradas",
        green.apply_to(summary.succeeded),
        red.apply_to(summary.failed.len()),
        yellow.apply_to(summary.skipped)
    );
    if !summary.failed.is_empty() {
        println!("  pendentes para a próxima execução: {}", summary.failed.join(", "));
    }
    if summary.interrupted {
        println!("{}", yellow.apply_to("execução interrompida; as pastas restantes continuam na entrada"));
    }
}

/// Lista o resultado de uma varredura sem processar nada.
pub fn print_scan_report(report: &ScanReport) {
    let green = Style::new().green();
    let dim = Style::new().dim();

    println!("{}", green.apply_to(format!("─── {} pastas pendentes ───", report.folders.len())));
    for folder in &report.folders {
        println!(
            "  {} ({} imagens, {})",
            folder.name,
            folder.images.len(),
            folder
                .document
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
    }
    if !report.skipped.is_empty() {
        println!("{}", dim.apply_to(format!("─── {} pastas ignoradas ───", report.skipped.len())));
        for skipped in &report.skipped {
            println!("  {}: {}", skipped.name, join(&skipped.problems));
        }
    }
}

/// Imprime a configuração efetiva; chaves de API aparecem apenas como definidas ou não.
pub fn print_config(config: &AppConfig) -> Result<(), toml::ser::Error> {
    let green = Style::new().green();
    let red = Style::new().red();

    println!("{}", toml::to_string_pretty(config)?);
    println!("─── Chaves de API ───");
    for provider in config.providers.rewrite.iter().chain(Some(&config.providers.title)) {
        let status = if provider.has_api_key() {
            green.apply_to("definida")
        } else {
            red.apply_to("ausente")
        };
        println!("  {} ({}): {status}", provider.name, provider.api_key_env);
    }
    Ok(())
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
