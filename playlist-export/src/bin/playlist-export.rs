use eyre::Context;
use std::io::IsTerminal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_playlist_export::csv_output::aggregate_playlists;
use youtube_playlist_export::export::{
    self, ExportReport, PUBLIC_PLAYLISTS_DIR, USER_PLAYLISTS_DIR,
};
use youtube_playlist_export::extract::FlatExtractor;
use youtube_playlist_export::{Config, authenticate};

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let config = Config::from_env();
    let playlist_urls: Vec<String> = std::env::args().skip(1).collect();

    // public URLs need no account, so skip the consent flow entirely
    let (dir_name, report) = if playlist_urls.is_empty() {
        let client = authenticate(&config).await?;
        let playlists = export::get_all_playlists(&client)
            .await
            .context("list playlists of the account")?;
        println!(
            "There are {} unique playlists for this YouTube account.",
            export::count_unique(&playlists)
        );
        let dir = config.output_dir.join(USER_PLAYLISTS_DIR);
        let report = export::export_owned_playlists(&client, &playlists, &dir).await?;
        (USER_PLAYLISTS_DIR, report)
    } else {
        let extractor = FlatExtractor::new(&config.yt_dlp);
        let dir = config.output_dir.join(PUBLIC_PLAYLISTS_DIR);
        let report = export::export_public_playlists(&extractor, &playlist_urls, &dir).await?;
        (PUBLIC_PLAYLISTS_DIR, report)
    };

    finish(&config, dir_name, &report)
}

fn finish(config: &Config, dir_name: &str, report: &ExportReport) -> eyre::Result<()> {
    println!("{report}");

    let dir = config.output_dir.join(dir_name);
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "no playlist CSVs were written, nothing to combine");
        return Ok(());
    }
    let summary = aggregate_playlists(&dir, Some(&format!("{dir_name}_videos.csv")))
        .context("combine playlist CSVs")?;
    println!(
        "Deleted videos: {}, Private videos: {}",
        summary.deleted, summary.private
    );
    println!("Combined CSV written to {}", summary.path.display());
    Ok(())
}
