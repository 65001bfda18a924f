use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use handsign::{PipelineConfig, ResourceCache, SignPredictor};
use rayon::prelude::*;

const TOP_K: usize = 3;

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            log::error!("{err:?}");
            eprintln!("handsign: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every image was processed without error.
fn run() -> Result<bool> {
    let locators: Vec<String> = std::env::args().skip(1).collect();
    if locators.is_empty() {
        anyhow::bail!("usage: handsign <image>...");
    }

    let config = PipelineConfig::from_env();
    let cache = Arc::new(ResourceCache::from_config(config).context("failed to load models")?);
    cache.preload().context("failed to load hand detector")?;
    let predictor = SignPredictor::new(cache);

    let results: Vec<_> = locators
        .par_iter()
        .map(|locator| (locator, predictor.classify_locator(locator)))
        .collect();

    let mut all_ok = true;
    for (locator, result) in results {
        match result {
            Ok(Some(classification)) => {
                log::debug!("{locator}: top {TOP_K} {:?}", classification.top_k(TOP_K));
                println!("{locator}\t{}", classification.label);
            }
            Ok(None) => println!("{locator}\t"),
            Err(err) => {
                all_ok = false;
                let code = err.code();
                let cause = anyhow::Error::from(err);
                eprintln!("{locator}\t{code}: {cause:#}");
            }
        }
    }

    Ok(all_ok)
}
