use std::path::PathBuf;
use structopt::StructOpt;
use tracing::{error, info};
use vmconfig::config::{BuildOptions, Builder, Certificate, StaticIdentity};
use vmconfig::VirtualMachineConfig;

#[derive(Debug, StructOpt)]
#[structopt(name = "vmconfig", about = "Virtual machine configuration tool")]
enum Opt {
    /// Build a configuration for an installed application and persist it
    Create {
        /// Package name of the owning application
        #[structopt(long, default_value = "unknown")]
        package: String,

        /// Path to the installed code bundle
        #[structopt(long)]
        apk: String,

        /// Signing certificate in canonical text form (repeat for the history, oldest first)
        #[structopt(long = "cert", required = true)]
        certs: Vec<String>,

        /// Path within the code bundle to the payload config
        #[structopt(long, default_value = "vm_config.json")]
        payload: String,

        /// YAML file with build options
        #[structopt(long, parse(from_os_str))]
        options: Option<PathBuf>,

        /// Enable debug mode
        #[structopt(long)]
        debug: bool,

        /// Requested RAM in MiB (0 = manager default)
        #[structopt(long)]
        memory_mib: Option<i32>,

        /// Output file
        #[structopt(short, long, parse(from_os_str))]
        out: PathBuf,
    },

    /// Print a persisted configuration as JSON
    Show {
        #[structopt(parse(from_os_str))]
        config: PathBuf,
    },

    /// Check whether two persisted configurations may share a VM instance
    Compat {
        #[structopt(parse(from_os_str))]
        previous: PathBuf,

        #[structopt(parse(from_os_str))]
        current: PathBuf,
    },

    /// Open the code bundle of a persisted configuration as the VM manager would receive it
    Wire {
        #[structopt(parse(from_os_str))]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();

    run(opt).map_err(|e| {
        error!("{}", e);
        e
    })
}

fn run(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    match opt {
        Opt::Create {
            package,
            apk,
            certs,
            payload,
            options,
            debug,
            memory_mib,
            out,
        } => {
            let certificates = certs
                .iter()
                .map(|c| Certificate::from_chars(c))
                .collect::<Result<Vec<_>, _>>()?;
            let identity = StaticIdentity {
                package_name: package,
                code_path: apk,
                certificates,
            };

            let mut builder = Builder::new(&identity, payload);
            if let Some(path) = options {
                builder = builder.with_options(&BuildOptions::load_from_file(path)?);
            }
            if debug {
                builder = builder.debug_mode(true);
            }
            if let Some(memory_mib) = memory_mib {
                builder = builder.memory_mib(memory_mib);
            }

            let config = builder.build()?;
            config.save_to_file(&out)?;
        }
        Opt::Show { config } => {
            let config = VirtualMachineConfig::load_from_file(config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Opt::Compat { previous, current } => {
            let previous = VirtualMachineConfig::load_from_file(previous)?;
            let current = VirtualMachineConfig::load_from_file(current)?;

            if previous.is_compatible_with(&current) {
                println!("compatible");
            } else {
                println!("incompatible");
                std::process::exit(1);
            }
        }
        Opt::Wire { config } => {
            let config = VirtualMachineConfig::load_from_file(config)?;
            let wire = config.to_wire()?;
            info!(
                apk = %config.apk_path(),
                bytes = wire.apk.metadata()?.len(),
                "Code bundle opened"
            );
            println!(
                "config_path={} debug={} memory_mib={}",
                wire.config_path, wire.debug, wire.memory_mib
            );
        }
    }

    Ok(())
}
