use clap::Parser;
use eyre::Result;
use janus_mpc_common::{config::Config, tracing::initialize_tracing};
use janus_mpc_cpu::{
    database_generators::{generate_scores, share_scores},
    execution::{
        player::Role,
        session::{NetworkSession, Session, SessionId},
    },
    matching::run_threshold_membership,
    network::tcp::{TcpConfig, TcpNetworking},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::{fs::OpenOptions, io::Write, path::PathBuf, time::Duration, time::Instant};

/// Two-party membership test on additively shared similarity scores.
#[derive(Parser, Debug)]
struct Args {
    /// `rs` listens and learns the result, `bp` connects
    party: Role,

    port: u16,

    #[clap(long = "bio-type")]
    bio_type: Option<String>,

    #[clap(short = 'N')]
    user_num: Option<usize>,

    #[clap(short = 'f')]
    fuse: Option<usize>,

    #[clap(long)]
    threshold: Option<u64>,

    /// Benchmark log the result line is appended to
    #[clap(long)]
    addr: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    initialize_tracing()?;
    let args = Args::parse();
    let mut config = Config::load_config("JANUS")?;
    if let Some(bio_type) = &args.bio_type {
        config.bio_type = bio_type.clone();
    }
    if let Some(n) = args.user_num {
        config.user_num = n;
    }
    if let Some(fuse) = args.fuse {
        config.fuse = fuse;
    }
    if args.threshold.is_some() {
        config.threshold = args.threshold;
    }
    let setting = config.score_setting()?;
    tracing::info!("{setting} as {}", args.party);

    let mut rng = ChaCha8Rng::seed_from_u64(config.data_seed);
    let scores = generate_scores(&mut rng, &setting);
    let [rs, bp] = share_scores(&mut rng, &setting, &scores);
    let own_scores = match args.party {
        Role::RegistrationStation => rs,
        Role::BiometricProvider => bp,
    };

    let tcp = TcpConfig::new(
        args.port,
        config.peer_host.clone(),
        Duration::from_secs(config.connect_timeout_secs),
    );
    let networking = TcpNetworking::establish(args.party, &tcp).await?;
    let network_session = NetworkSession::new(
        SessionId::from(0),
        args.party,
        args.party.identity(),
        args.party.peer().identity(),
        Box::new(networking),
    );
    tracing::warn!(
        dealer_seed = config.dealer_seed,
        "triples come from a seeded dealer both parties know, this run is a benchmark and not private"
    );
    let mut session = Session::setup(network_session, config.dealer_seed).await?;

    let start = Instant::now();
    let outcome = run_threshold_membership(&mut session, &setting, &own_scores).await?;
    let duration_ms = start.elapsed().as_millis();

    match outcome.membership {
        Some(member) => println!("membership: {member}"),
        None => println!("membership revealed to {}", Role::QUERIER),
    }
    println!("time: {duration_ms} ms, sent: {} bytes", outcome.bytes_sent);

    if let Some(path) = &args.addr {
        let mut log = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(
            log,
            "{}, {}, {duration_ms}, {}",
            setting.user_num(),
            setting.fuse(),
            outcome.bytes_sent
        )?;
    }
    Ok(())
}
