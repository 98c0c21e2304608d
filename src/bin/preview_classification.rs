use anyhow::Context;
use inbox_archiver::classifier::{Classifier, build_prompt};
use inbox_archiver::config::Settings;
use inbox_archiver::models::{ArchiveRecord, Message};
use std::io::Read;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("Usage: {} [body_file]", args[0]);
        eprintln!("Classifies an email body (from the file or stdin) and prints the parsed labels.");
        std::process::exit(1);
    }

    let body = match args.get(1) {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?,
        None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read stdin")?;
            body
        }
    };

    let settings = Settings::load()?;
    let classifier = Classifier::from_config(&settings.config.classifier, settings.openai_api_key.clone())?;

    println!("PROMPT:");
    println!("{}", build_prompt(&body));
    println!(
        "--------------------------------------------------------------------------------"
    );

    if !classifier.is_enabled() {
        println!("(classification disabled, set OPENAI_API_KEY)");
    }

    let classification = classifier.classify(&body).await?;

    let mut labels: Vec<_> = classification.fields.iter().collect();
    labels.sort();
    println!("PARSED LABELS:");
    for (label, value) in labels {
        println!("{}: {}", label, value);
    }
    println!(
        "--------------------------------------------------------------------------------"
    );

    let message = Message {
        id: "preview".to_string(),
        sender: "preview".to_string(),
        subject: "(preview)".to_string(),
        body,
        is_read: false,
    };
    let record = ArchiveRecord::new(&message, &classification, &settings.config.archive.fallback_category);
    println!("ARCHIVED FIELDS:");
    println!("summary: {}", record.summary);
    println!("category: {}", record.category);
    println!("sentiment: {}", record.sentiment);

    Ok(())
}
