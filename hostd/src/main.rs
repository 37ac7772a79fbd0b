use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::info;

use common::telemetry::{get_subscriber, init_subscriber};
use hostd::rpc::hostd::host_service_server::HostServiceServer;
use hostd::service::HostServiceImpl;
use hostd::supervisor::{EmulatorConfig, EmulatorSupervisor};

#[derive(Parser, Debug)]
#[clap(
    name = "hostd",
    about = "host daemon - supervises qemu-system-x86_64 emulator instances for a pool host",
    rename_all = "kebab-case",
    rename_all_env = "screaming-snake"
)]
pub struct Args {
    /// Port to listen on
    #[clap(short, long, default_value = "50052")]
    port: u16,

    /// Runtime directory for VM disks, monitor sockets, and logs
    #[clap(long, env = "HC_HOME", default_value = "/var/lib/hostd/vms")]
    runtime_dir: PathBuf,

    /// Path to the qemu-system-x86_64 binary
    #[clap(long, default_value = "/usr/bin/qemu-system-x86_64")]
    qemu_binary: PathBuf,

    /// Path to the qemu-img binary
    #[clap(long, default_value = "/usr/bin/qemu-img")]
    qemu_img_binary: PathBuf,

    /// Kernel image booted by every VM on this host
    #[clap(long, default_value = "/var/lib/hostd/images/vmlinuz")]
    kernel: PathBuf,

    /// Golden root disk image warm instances are forked from
    #[clap(long, default_value = "/var/lib/hostd/images/root.qcow2")]
    root_image: PathBuf,

    /// PCI BDFs of GPUs available for passthrough on this host, e.g. 0000:01:00.0
    #[clap(long)]
    gpu_bdf: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = get_subscriber("hostd".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let args = Args::parse();
    let addr = format!("0.0.0.0:{}", args.port).parse()?;

    info!("hostd starting on {}", addr);
    info!("runtime directory: {}", args.runtime_dir.display());
    info!("qemu binary: {}", args.qemu_binary.display());
    info!("gpu bdfs: {:?}", args.gpu_bdf);

    tokio::fs::create_dir_all(&args.runtime_dir).await?;

    let supervisor = Arc::new(EmulatorSupervisor::new(EmulatorConfig {
        qemu_binary: args.qemu_binary,
        qemu_img_binary: args.qemu_img_binary,
        kernel: args.kernel,
        root_image: args.root_image,
        runtime_dir: args.runtime_dir,
    }));

    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    let service = HostServiceImpl::new(supervisor, hostname, args.gpu_bdf);

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<HostServiceServer<HostServiceImpl>>()
        .await;

    Server::builder()
        .add_service(health_service)
        .add_service(HostServiceServer::new(service))
        .serve(addr)
        .await?;

    Ok(())
}
