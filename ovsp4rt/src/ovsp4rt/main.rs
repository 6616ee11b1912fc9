/*
Copyright (c) 2021 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

use anyhow::{anyhow, bail, Context, Result};

use clap::{Parser, Subcommand};

use daemon::Daemonize;

use ovsp4rt::config::{DEFAULT_DEVICE_ID, DEFAULT_GRPC_ADDR, DEFAULT_ROLE_NAME};
use ovsp4rt::journal::read_records;
use ovsp4rt::{
    str_to_tunnel_type,
    Config,
    Dispatcher,
    Event,
    IpAddress,
    IpMacMapInfo,
    MacAddr,
    MacLearningInfo,
    PortVlanInfo,
    SrcPortInfo,
    Target,
    TunnelInfo,
};

use p4ext::credentials::DEFAULT_CERTS_DIR;
use p4ext::session::DEFAULT_ROLE_CONFIG_FILE;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::unix::io::RawFd;
use std::path::PathBuf;

use tracing::{event, Level};

use tracing_subscriber::EnvFilter;

const VXLAN_PORT: &str = "4789";

/// Program P4 forwarding tables over P4Runtime on behalf of Open vSwitch
#[derive(Parser, Debug)]
#[clap(name = "ovsp4rt", version)]
struct Args {
    #[clap(flatten)]
    config: ConfigArgs,

    #[clap(flatten)]
    daemonize: Daemonize,

    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct ConfigArgs {
    /// P4Runtime server address
    #[clap(long, default_value = DEFAULT_GRPC_ADDR)]
    grpc_addr: String,

    #[clap(long, default_value_t = DEFAULT_DEVICE_ID)]
    device_id: u64,

    /// Role to arbitrate for
    #[clap(long, default_value = DEFAULT_ROLE_NAME)]
    role_name: String,

    /// Pipeline flavor: "dpdk" or "es2k"
    #[clap(long, default_value = "es2k")]
    target: Target,

    /// Directory with ca.crt, client.crt, and client.key
    #[clap(long, default_value = DEFAULT_CERTS_DIR)]
    certs_dir: PathBuf,

    /// Role config to attach to arbitration
    #[clap(long, default_value = DEFAULT_ROLE_CONFIG_FILE)]
    role_config_file: PathBuf,

    /// Arbitrate without a role config
    #[clap(long)]
    no_role_config: bool,

    /// Append a record of each call to this file
    #[clap(long)]
    journal: Option<PathBuf>,
}

impl From<ConfigArgs> for Config {
    fn from(args: ConfigArgs) -> Self {
        Config {
            grpc_addr: args.grpc_addr,
            device_id: args.device_id,
            role_name: args.role_name,
            target: args.target,
            certs_dir: args.certs_dir,
            role_config_file: if args.no_role_config {
                None
            } else {
                Some(args.role_config_file)
            },
            journal: args.journal,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add or remove a learned MAC address
    Fdb(FdbArgs),

    /// Add or remove a VXLAN tunnel
    Tunnel(TunnelArgs),

    /// Map a source port and VLAN to a bridge
    SrcPort(SrcPortArgs),

    /// Add or remove VLAN push and pop entries
    Vlan(VlanArgs),

    /// Add or remove IPv4-to-MAC bindings
    IpMac(IpMacArgs),

    /// Print the device's tables and actions
    ListTables,

    /// Replay journal records read from a file or stdin
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
struct TunnelEndpoints {
    /// Local tunnel endpoint
    #[clap(long)]
    local_ip: Option<IpAddress>,

    /// Remote tunnel endpoint
    #[clap(long)]
    remote_ip: Option<IpAddress>,

    #[clap(long, default_value_t = 0)]
    vni: u32,

    /// UDP destination port
    #[clap(long, default_value = VXLAN_PORT)]
    dst_port: u16,
}

#[derive(clap::Args, Debug)]
struct FdbArgs {
    #[clap(long)]
    mac: MacAddr,

    #[clap(long, default_value_t = 0)]
    bridge_id: u8,

    #[clap(long, default_value_t = 0)]
    src_port: u32,

    #[clap(long, default_value_t = 0)]
    rx_src_port: u32,

    /// Learned on this VLAN
    #[clap(long)]
    vlan_id: Option<u16>,

    /// Learned behind a tunnel (requires --remote-ip)
    #[clap(flatten)]
    tunnel: TunnelEndpoints,

    /// Remove instead of add
    #[clap(long)]
    delete: bool,
}

#[derive(clap::Args, Debug)]
struct TunnelArgs {
    #[clap(flatten)]
    endpoints: TunnelEndpoints,

    #[clap(long, default_value_t = 0)]
    ifindex: u32,

    #[clap(long, default_value_t = 0)]
    port_id: u32,

    #[clap(long, default_value_t = 0)]
    src_port: u32,

    #[clap(long, default_value_t = 0)]
    bridge_id: u8,

    /// "vxlan" or "geneve"
    #[clap(long, default_value = "vxlan")]
    tunnel_type: String,

    #[clap(long)]
    delete: bool,
}

#[derive(clap::Args, Debug)]
struct SrcPortArgs {
    #[clap(long)]
    bridge_id: u8,

    #[clap(long, default_value_t = 0)]
    vlan_id: u16,

    #[clap(long)]
    src_port: u32,

    #[clap(long)]
    delete: bool,
}

#[derive(clap::Args, Debug)]
struct VlanArgs {
    vlan_id: u16,

    #[clap(long)]
    delete: bool,
}

#[derive(clap::Args, Debug)]
struct IpMacArgs {
    #[clap(long, default_value = "00:00:00:00:00:00")]
    src_mac: MacAddr,

    #[clap(long, default_value = "00:00:00:00:00:00")]
    dst_mac: MacAddr,

    /// Entries for an address that is not a valid unicast IPv4 address are skipped
    #[clap(long, default_value = "0.0.0.0/0")]
    src_ip: IpAddress,

    #[clap(long, default_value = "0.0.0.0/0")]
    dst_ip: IpAddress,

    #[clap(long)]
    delete: bool,
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Read records from this file instead of stdin
    #[clap(long)]
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    let Args { config, daemonize, verbose, command } = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let config = Config::from(config);
    let (event, insert) = match command {
        Command::Serve(args) => return serve(config, daemonize, args),
        _ if daemonize != Daemonize::default() => bail!("daemon options only apply to \"serve\""),
        Command::ListTables => return list_tables(config),
        Command::Fdb(args) => fdb_event(args)?,
        Command::Tunnel(args) => tunnel_event(args)?,
        Command::SrcPort(args) => (
            Event::SrcPort(SrcPortInfo {
                bridge_id: args.bridge_id,
                vlan_id: args.vlan_id,
                src_port: args.src_port,
            }),
            !args.delete,
        ),
        Command::Vlan(args) => (Event::Vlan(args.vlan_id), !args.delete),
        Command::IpMac(args) => (
            Event::IpMacMap(IpMacMapInfo {
                src_mac_addr: args.src_mac,
                dst_mac_addr: args.dst_mac,
                src_ip_addr: args.src_ip,
                dst_ip_addr: args.dst_ip,
            }),
            !args.delete,
        ),
    };

    let dispatcher = Dispatcher::from_config(config)?;
    dispatcher
        .dispatch(&event, insert)
        .with_context(|| format!("{} failed", event.func_name()))
}

fn tunnel_info(endpoints: TunnelEndpoints) -> Result<TunnelInfo> {
    let TunnelEndpoints { local_ip, remote_ip, vni, dst_port } = endpoints;
    Ok(TunnelInfo {
        local_ip: local_ip.ok_or_else(|| anyhow!("--local-ip is required"))?,
        remote_ip: remote_ip.ok_or_else(|| anyhow!("--remote-ip is required"))?,
        vni,
        dst_port,
        ..Default::default()
    })
}

fn fdb_event(args: FdbArgs) -> Result<(Event, bool)> {
    let FdbArgs { mac, bridge_id, src_port, rx_src_port, vlan_id, tunnel, delete } = args;
    let tunnel_info = match tunnel.remote_ip {
        Some(remote_ip) => TunnelInfo {
            local_ip: tunnel.local_ip.unwrap_or_default(),
            remote_ip,
            vni: tunnel.vni,
            dst_port: tunnel.dst_port,
            ..Default::default()
        },
        None if vlan_id.is_some() => TunnelInfo::default(),
        None => bail!("one of --vlan-id or --remote-ip is required"),
    };
    let info = MacLearningInfo {
        is_tunnel: tunnel.remote_ip.is_some(),
        is_vlan: vlan_id.is_some(),
        mac_addr: mac,
        bridge_id,
        src_port,
        rx_src_port,
        vlan_info: PortVlanInfo::default(),
        tunnel_info,
        vlan_id: vlan_id.unwrap_or(0),
    };
    Ok((Event::Fdb(info), !delete))
}

fn tunnel_event(args: TunnelArgs) -> Result<(Event, bool)> {
    let tunnel_type = str_to_tunnel_type(&args.tunnel_type)
        .ok_or_else(|| anyhow!("{}: unknown tunnel type", args.tunnel_type))?;
    let info = TunnelInfo {
        ifindex: args.ifindex,
        port_id: args.port_id,
        src_port: args.src_port,
        bridge_id: args.bridge_id,
        tunnel_type,
        ..tunnel_info(args.endpoints)?
    };
    Ok((Event::Tunnel(info), !args.delete))
}

fn list_tables(config: Config) -> Result<()> {
    let dispatcher = Dispatcher::from_config(config)?;
    let schema = dispatcher.schema().context("could not fetch pipeline")?;
    print!("{}", schema);
    Ok(())
}

fn serve(config: Config, daemonize: Daemonize, args: ServeArgs) -> Result<()> {
    let (daemonizing, _cleanup) = unsafe { daemonize.start() }?;

    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("could not open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let dispatcher = Dispatcher::from_config(config)?;

    let exempt: &[RawFd] = if args.input.is_none() { &[0] } else { &[] };
    daemonizing.complete(exempt)?;

    let (mut applied, mut failed) = (0usize, 0usize);
    for record in read_records(input) {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                event!(Level::ERROR, "{:#}", anyhow::Error::from(e));
                failed += 1;
                continue;
            }
        };
        match dispatcher.dispatch(&record.params.event, record.params.insert_entry) {
            Ok(()) => applied += 1,
            Err(e) => {
                event!(Level::ERROR, "{}: {:#}", record.func_name, anyhow::Error::from(e));
                failed += 1;
            }
        }
    }
    event!(Level::INFO, "replayed {} records, {} failed", applied + failed, failed);
    Ok(())
}
