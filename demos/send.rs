use async_smtp_send::{send, SendParameters};
use structopt::StructOpt;
use tokio::io::{self, AsyncReadExt};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    // Collect all inputs
    let opt = Opt::from_args();
    println!("Type your mail and finish with Ctrl+D:");

    match send_mail(opt).await {
        Ok(text) => println!("Email sent. Response: {}", text),
        Err(err) => println!("Could not send email: {}", err),
    }
}

async fn send_mail(opt: Opt) -> Result<String> {
    let mut body = vec![];
    io::stdin().read_to_end(&mut body).await?;

    let mut parameters = SendParameters::new()
        .hostname(opt.server)
        .start_tls(opt.starttls)
        .sender(opt.from)
        .recipients(opt.to);
    if let Some(port) = opt.port {
        parameters = parameters.port(port);
    }
    if let (Some(username), Some(password)) = (opt.username, opt.password) {
        parameters = parameters.username(username).password(password);
    }

    let (replies, text) = send(body, parameters).await?;
    for (recipient, reply) in replies {
        println!("{}: {}", recipient, reply);
    }

    Ok(text)
}

#[derive(StructOpt, Debug)]
#[structopt(name = "send")]
struct Opt {
    /// Mail from
    #[structopt(short = "f", name = "sender address")]
    from: String,

    /// Rcpt to, can be repeated multiple times
    #[structopt(short = "t", name = "recipient address", min_values = 1)]
    to: Vec<String>,

    /// SMTP server to talk to
    #[structopt(short = "s", name = "smtp server", default_value = "localhost")]
    server: String,

    /// Port, derived from the TLS mode when not given
    #[structopt(short = "p")]
    port: Option<u16>,

    /// Upgrade the connection with STARTTLS
    #[structopt(long)]
    starttls: bool,

    /// User name for AUTH
    #[structopt(short = "u")]
    username: Option<String>,

    /// Password for AUTH
    #[structopt(short = "w")]
    password: Option<String>,
}
