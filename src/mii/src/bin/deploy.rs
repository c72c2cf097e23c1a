use mii::{cli, Deployment};
use std::{error::Error, process};

fn run() -> Result<(), Box<dyn Error>> {
    let matches = cli::app().get_matches();
    let request = cli::request(&matches)?;
    let deployer = cli::deployer(&matches);
    match deployer.deploy(request)? {
        Deployment::Local(handle) => {
            println!(
                "service is ready, serving {}",
                handle.deployment_names().join(", ")
            );
            handle.wait()?;
        }
        Deployment::Aml(_) => {}
        Deployment::NonPersistent(deployment_tag) => {
            println!(
                "{} is loaded in this process and lives until it exits",
                deployment_tag
            );
        }
    }
    Ok(())
}

fn main() {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_timestamp_micros().init();
    if let Err(err) = run() {
        log::error!("{}", err);
        process::exit(1);
    }
}
