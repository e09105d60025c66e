/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use iksxmpp::Jid;
use iksxmpp::XmppClient;
use iksxmpp::XmppClientError;

const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

fn print_version() {
    println!("iksjab (iksxmpp) v{}", iksxmpp::VERSION);
}

fn print_usage() {
    println!(concat!(
        "Usage: iksjab [OPTIONS]\n",
        "This tool can communicate over XMPP.\n",
        "Options:\n",
        "  -j, --jid <JID>        Jabber ID\n",
        "  -p, --password <PASS>  Password (asked if not given)\n",
        "  -a, --anonymous        Log in anonymously\n",
        "  -s, --server <HOST>    Connect to this host instead of the JID domain\n",
        "  -e, --no-encryption    Do not upgrade the connection with STARTTLS\n",
        "  -S, --ssl              Use TLS from the start of the connection\n",
        "  -t, --to <JID>         Send a message to this JID\n",
        "  -m, --message <TEXT>   Body of the message to send\n",
        "  -r, --roster           Print the roster\n",
        "  -l, --listen <SECS>    Print incoming messages for this long\n",
        "  -d, --debug            Log the protocol traffic\n",
        "  -h, --help             Display this help message and exit\n",
        "  -v, --version          Display the version and exit\n",
        "Report issues at https://github.com/meduketto/iksemel-rust/issues"
    ));
}

#[derive(Default)]
struct Options {
    jid: Option<Jid>,
    password: Option<String>,
    anonymous: bool,
    server: Option<String>,
    no_encryption: bool,
    ssl: bool,
    to: Option<String>,
    message: Option<String>,
    roster: bool,
    listen: u64,
    debug: bool,
}

fn run(options: Options, jid: Jid) -> Result<(), XmppClientError> {
    let mut builder = XmppClient::build(jid)
        .server(options.server)
        .use_encryption(!options.no_encryption)
        .use_ssl(options.ssl)
        .reconnect(false);
    if !options.anonymous {
        let password = match options.password {
            Some(password) => password,
            None => rpassword::prompt_password("Password: ")?,
        };
        builder = builder.password(password);
    }
    let mut client = builder.connect()?;

    client.add_event_handler("message", |_, payload| {
        println!(
            "{}: {}",
            payload.get("from").unwrap_or_default(),
            payload.get("body").unwrap_or_default()
        );
    });
    client.add_event_handler("presence", |_, payload| {
        println!(
            "{} is {}",
            payload.get("from").unwrap_or_default(),
            payload.get("show").unwrap_or_default()
        );
    });

    if client
        .wait_until(&["session_start"], Some(SESSION_TIMEOUT))?
        .is_empty()
    {
        return Err(XmppClientError::Connection(
            "session was not established".to_string(),
        ));
    }
    client.presence(None, "available", None, "available", 0)?;

    if options.roster {
        client.get_roster()?;
        client.wait_until(&["roster_received"], Some(SESSION_TIMEOUT))?;
        for contact in client.roster().contacts() {
            println!("{} [{}] {}", contact.jid, contact.subscription, contact.name);
        }
    }

    if let (Some(to), Some(body)) = (&options.to, &options.message) {
        client.message(to, body, "chat", None)?;
    }

    if options.listen > 0 {
        client.process(Some(Duration::from_secs(options.listen)))?;
    }

    client.disconnect()
}

fn main() -> ExitCode {
    let mut args = env::args();
    let mut options = Options::default();

    // Skip the first argument (program name)
    args.next();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-a" | "--anonymous" => options.anonymous = true,
            "-e" | "--no-encryption" => options.no_encryption = true,
            "-S" | "--ssl" => options.ssl = true,
            "-r" | "--roster" => options.roster = true,
            "-d" | "--debug" => options.debug = true,
            "-h" | "--help" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            "-v" | "--version" => {
                print_version();
                return ExitCode::SUCCESS;
            }
            "-j" | "--jid" | "-p" | "--password" | "-s" | "--server" | "-t" | "--to"
            | "-m" | "--message" | "-l" | "--listen" => {
                let Some(value) = args.next() else {
                    eprintln!("Error: value expected after {arg}");
                    return ExitCode::FAILURE;
                };
                match arg.as_str() {
                    "-j" | "--jid" => match Jid::new(&value) {
                        Ok(jid) => options.jid = Some(jid),
                        Err(err) => {
                            eprintln!("Error: {err}");
                            return ExitCode::FAILURE;
                        }
                    },
                    "-p" | "--password" => options.password = Some(value),
                    "-s" | "--server" => options.server = Some(value),
                    "-t" | "--to" => options.to = Some(value),
                    "-m" | "--message" => options.message = Some(value),
                    _ => match value.parse() {
                        Ok(secs) => options.listen = secs,
                        Err(_) => {
                            eprintln!("Error: invalid number of seconds {value}");
                            return ExitCode::FAILURE;
                        }
                    },
                }
            }
            _ => {
                eprintln!("Error: unknown option {arg}");
                return ExitCode::FAILURE;
            }
        }
    }

    let default_level = if options.debug { "iksxmpp=trace" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(jid) = options.jid.take() else {
        eprintln!("Error: Jabber ID is required");
        return ExitCode::FAILURE;
    };

    match run(options, jid) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
