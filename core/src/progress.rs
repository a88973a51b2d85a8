use indicatif::{ProgressBar, ProgressStyle};

pub fn default_style() -> ProgressStyle {
    match ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        Ok(style) => style.progress_chars("##-"),
        Err(_) => ProgressStyle::default_bar(),
    }
}

/// Bar counting finished reference tasks, labelled with the active tags.
pub fn ranking_bar(references: usize, backend: &str, model: &str) -> ProgressBar {
    let bar = ProgressBar::new(references as u64);
    bar.set_style(default_style());
    bar.set_message(format!("ranking with {} on {}", model, backend));
    bar
}

/// Bar for copying `files` selected candidates.
pub fn copy_bar(files: usize) -> ProgressBar {
    let bar = ProgressBar::new(files as u64);
    bar.set_style(default_style());
    bar
}
