use anyhow::Result;

mod logging;

const APP_NAME: &str = "apigrid";

fn main() {
    match real_main() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn real_main() -> Result<i32> {
    let matches = apigrid::cli::build_cli().get_matches();

    logging::init(matches.get_flag("verbose"))?;

    let user_agent = format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION"));
    apigrid::cli::drive_command(&matches, &user_agent)
}
