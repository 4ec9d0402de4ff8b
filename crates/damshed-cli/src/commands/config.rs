use crate::cli::{ConfigArgs, ConfigCommand};
use crate::config_loader::LoadedConfig;
use crate::output::OutputWriter;
use crate::output_types::{ConfigOutput, ConfigRow};
use anyhow::Result;

pub fn execute(args: ConfigArgs, loaded: &LoadedConfig, output: &OutputWriter) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show(loaded, output),
    }
}

fn show(loaded: &LoadedConfig, output: &OutputWriter) -> Result<()> {
    let mut settings: Vec<ConfigRow> = loaded
        .layered
        .to_inspection_map()
        .into_iter()
        .map(|(key, (value, source))| ConfigRow {
            key,
            value,
            source: format!("{:?}", source),
        })
        .collect();
    settings.sort_by(|a, b| a.key.cmp(&b.key));

    let result = ConfigOutput {
        config_file: loaded.file.clone(),
        settings,
    };

    if output.is_json() {
        return output.result(&result);
    }

    output.section("Configuration");
    match &result.config_file {
        Some(path) => output.kv("Config file", path.display()),
        None => output.kv("Config file", "(none, defaults and environment only)"),
    }
    output.table(result.settings);

    // Surface validation problems without failing the command
    if let Err(e) = loaded.resolve() {
        output.warning(format!("Configuration does not resolve: {:#}", e));
    }
    Ok(())
}
