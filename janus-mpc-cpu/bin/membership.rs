use clap::Parser;
use eyre::Result;
use janus_mpc_common::{config::Config, tracing::initialize_tracing};
use janus_mpc_cpu::{
    database_generators::{generate_database, split_inputs},
    execution::{
        player::Role,
        session::{NetworkSession, Session, SessionId},
    },
    matching::run_membership,
    network::tcp::{TcpConfig, TcpNetworking},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::{fs::OpenOptions, io::Write, path::PathBuf, time::Duration, time::Instant};

/// Two-party biometric membership test over TCP.
#[derive(Parser, Debug)]
struct Args {
    /// `rs` listens and learns the result, `bp` connects
    party: Role,

    port: u16,

    #[clap(long = "bio-type")]
    bio_type: Option<String>,

    /// Number of enrolled identities
    #[clap(short = 'N')]
    user_num: Option<usize>,

    /// Templates per identity
    #[clap(short = 'f')]
    fuse: Option<usize>,

    #[clap(long = "ts")]
    template_size: Option<usize>,

    /// hamming, masked-hamming or euclidean
    #[clap(long)]
    metric: Option<String>,

    /// Distance threshold of hamming and euclidean
    #[clap(long)]
    threshold: Option<u64>,

    /// Masked-hamming matches below `numerator / 128` of the valid slots
    #[clap(long = "fraction-numerator")]
    fraction_numerator: Option<u64>,

    /// Query is template 0 with this many slots changed
    #[clap(long)]
    near: Option<usize>,

    /// Benchmark log the result line is appended to
    #[clap(long)]
    addr: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(bio_type) = &self.bio_type {
            config.bio_type = bio_type.clone();
        }
        if let Some(n) = self.user_num {
            config.user_num = n;
        }
        if let Some(fuse) = self.fuse {
            config.fuse = fuse;
        }
        if let Some(ts) = self.template_size {
            config.template_size = ts;
        }
        if self.metric.is_some() {
            config.metric = self.metric.clone();
        }
        if self.threshold.is_some() {
            config.threshold = self.threshold;
        }
        if let Some(numerator) = self.fraction_numerator {
            config.fraction_numerator = numerator;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    initialize_tracing()?;
    let args = Args::parse();
    let mut config = Config::load_config("JANUS")?;
    args.apply(&mut config);
    let setting = config.bio_setting()?;
    tracing::info!("{setting} as {}", args.party);

    // both parties derive the same synthetic data and keep their own half
    let mut rng = ChaCha8Rng::seed_from_u64(config.data_seed);
    let (database, query) = generate_database(&mut rng, &setting, args.near.map(|n| (0, n)));
    let [rs, bp] = split_inputs(&mut rng, &database, &query);
    let input = match args.party {
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
    let outcome = run_membership(&mut session, &setting, &input).await?;
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
            "{}, {}, {}, {duration_ms}, {}",
            setting.user_num(),
            setting.fuse(),
            setting.template_size(),
            outcome.bytes_sent
        )?;
    }
    Ok(())
}
