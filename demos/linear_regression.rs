use microflow::{
  config::{ Config, Mode },
  data::Dataset,
  train::{ LinearRegression, LogReporter },
};

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  // Optional JSON config as first argument
  let config = match std::env::args().nth(1) {
    Some(path) => match Config::load(&path) {
      Ok(config) => config,
      Err(err) => {
        log::error!("Could not load {}: {}", path, err);
        std::process::exit(1);
      },
    },
    None => Config::default(),
  };

  // Train the same model in both modes
  let mut summaries = vec![];
  for mode in [Mode::Eager, Mode::Graph] {
    let config = Config { mode, ..config.clone() };
    let summary = LinearRegression::new(config, Dataset::linear_regression())
      .and_then(|model| model.run(&mut LogReporter) );
    match summary {
      Ok(summary) => summaries.push(summary),
      Err(err) => {
        log::error!("{:?} mode failed: {}", mode, err);
        std::process::exit(1);
      },
    }
  }

  match serde_json::to_string_pretty(&summaries) {
    Ok(json) => println!("{}", json),
    Err(err) => log::error!("Could not encode summaries: {}", err),
  }
}
