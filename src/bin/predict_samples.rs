//! Posts every image in a sample directory to a running classifier and prints the responses.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::Context;
use reqwest::blocking::{Client, multipart};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let api = env::var("API_URL").unwrap_or_else(|_| "http://127.0.0.1:7860/api/predict".into());
    let dir = env::args().nth(1).unwrap_or_else(|| "samples".into());
    let dir = Path::new(&dir);

    if !dir.exists() {
        println!("Create {}/ and add images to test.", dir.display());
        return Ok(());
    }

    let client = Client::new();
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if !is_image(&path) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();

        let form = multipart::Form::new()
            .text("top_k", "3")
            .file("file", &path)
            .with_context(|| format!("reading {}", path.display()))?;
        let response = client.post(&api).multipart(form).send()?;
        let status = response.status();
        let body = response.text()?;

        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => println!("{name} {} {}", status.as_u16(), serde_json::to_string_pretty(&json)?),
            Err(_) => println!("{name} {} {body}", status.as_u16()),
        }
    }

    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
