use std::{fs, io::Read, path::Path};

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};

use crate::{
    api::{self, ConnectError},
    cli::{AnalyzeArgs, ProviderArgs},
    config::ProviderConfig,
    headers::normalize_headers,
    inference::SchemaInferenceService,
    io_utils::{self, CsvInput},
    provider::{OpenAiProvider, ReasoningProvider, ReplayProvider},
    review::{EMPTY_RESULT_MESSAGE, ReviewSet},
};

pub const NO_HEADERS_MESSAGE: &str = "No CSV headers were found. Please upload a valid CSV file.";

pub fn execute(args: &AnalyzeArgs) -> Result<()> {
    match (&args.request, &args.input) {
        (Some(request), _) => answer_request(request, &args.provider),
        (None, Some(input)) => analyze_file(input, args),
        (None, None) => bail!("Either --input or --request is required"),
    }
}

/// Picks the replay provider when a recording is given, otherwise the
/// networked provider, which requires a credential.
pub fn connect(args: &ProviderArgs) -> Result<Box<dyn ReasoningProvider>, ConnectError> {
    if let Some(path) = &args.proposals {
        return Ok(Box::new(ReplayProvider::new(path)));
    }
    let config = ProviderConfig::from_env().with_overrides(args);
    debug!("Provider configuration: {config:?}");
    Ok(Box::new(OpenAiProvider::from_config(&config)?))
}

fn analyze_file(input: &Path, args: &AnalyzeArgs) -> Result<()> {
    let provider = connect(&args.provider)?;

    let delimiter = io_utils::resolve_input_delimiter(input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Reading headers of '{}' with delimiter '{}'",
        input.display(),
        crate::printable_delimiter(delimiter)
    );
    let csv = CsvInput::open(input, delimiter, encoding)
        .with_context(|| format!("Reading CSV headers from {input:?}"))?;
    let raw_headers = csv.headers().to_vec();
    if raw_headers.iter().all(|header| header.trim().is_empty()) {
        bail!(NO_HEADERS_MESSAGE);
    }

    let service = SchemaInferenceService::new(provider);
    let mappings = service
        .infer(&raw_headers)
        .with_context(|| format!("Analyzing headers of {input:?}"))?;
    let review = ReviewSet::from_mappings(mappings)
        .with_source(&input.display().to_string(), &normalize_headers(&raw_headers));

    if review.is_empty() {
        warn!("{EMPTY_RESULT_MESSAGE}");
        println!("{EMPTY_RESULT_MESSAGE}");
    } else {
        print!("{}", review.render());
    }

    if let Some(output) = &args.output {
        review
            .save(output)
            .with_context(|| format!("Writing review file {output:?}"))?;
        info!(
            "{} proposed mapping(s) written to {:?}",
            review.mappings.len(),
            output
        );
    }
    Ok(())
}

fn answer_request(request: &Path, provider: &ProviderArgs) -> Result<()> {
    let mut body = String::new();
    if io_utils::is_dash(request) {
        std::io::stdin()
            .read_to_string(&mut body)
            .context("Reading request body from stdin")?;
    } else {
        body = fs::read_to_string(request)
            .with_context(|| format!("Reading request body from {request:?}"))?;
    }

    let reply = api::handle_analyze(&body, || connect(provider));
    let rendered = serde_json::to_string_pretty(&reply.body).context("Encoding reply")?;
    println!("{rendered}");
    if !reply.is_success() {
        bail!("Schema analysis failed with status {}", reply.status);
    }
    Ok(())
}
