//! Subcommand handlers.

use anyhow::{Result, bail};
use mailagent_api::{ChatSender, EmailRecord, LogFilters, Preferences, SaveChatMessage, SaveEmail};
use mailagent_auth::TokenStore;
use mailagent_core::GeneratedEmail;

use crate::context::AppContext;
use crate::{
    AccountCommand, Command, ConfigsCommand, HistoryArgs, LogsArgs, PasswordCommand, PrefsCommand,
    VarsCommand,
};

pub(crate) async fn run(ctx: &AppContext, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let resp = ctx.api.auth().login(&email, &password).await?;
            let name = resp
                .user
                .as_ref()
                .and_then(|u| u.username.clone())
                .unwrap_or(email);
            println!("Signed in as {name}.");
        }
        Command::Register {
            email,
            username,
            password,
        } => {
            let reg = ctx
                .api
                .auth()
                .register(&email, username.as_deref(), &password)
                .await?;
            println!("{}", reg.message.unwrap_or_else(|| "Registered.".into()));
            if reg.requires_verification {
                println!("Run `mailagent verify --email {email} --code <code>` with the emailed code.");
            }
        }
        Command::Verify { email, code } => match code {
            Some(code) => {
                let _ = ctx.api.auth().verify_otp(&email, &code).await?;
                println!("Email verified; signed in.");
            }
            None => {
                let resp = ctx.api.auth().resend_otp(&email).await?;
                println!("{}", resp.message);
            }
        },
        Command::Logout => {
            ctx.api.auth().logout().await?;
            println!("Signed out.");
        }
        Command::Whoami => whoami(ctx).await?,
        Command::Chat {
            message,
            tone,
            save,
        } => chat(ctx, &message, tone.as_deref(), save).await?,
        Command::Email {
            to,
            prompt,
            tone,
            save,
        } => generate(ctx, &to, &prompt, tone.as_deref(), save).await?,
        Command::Drafts => {
            let drafts = ctx.api.emails().drafts().await?;
            if drafts.is_empty() {
                println!("No drafts.");
            }
            for draft in &drafts {
                print_record(draft);
            }
        }
        Command::History(args) => history(ctx, args).await?,
        Command::Stats => {
            let stats = ctx.api.emails().usage_stats().await?;
            println!("Emails generated: {}", stats.total_emails);
            println!("Sent:             {:.0}%", stats.success_rate);
            println!("Time saved:       {:.1} h", stats.time_saved_hours);
            for activity in &stats.recent_activity {
                println!("  {}  {} [{}]", activity.time, activity.action, activity.status);
            }
        }
        Command::Configs(cmd) => configs(ctx, cmd).await?,
        Command::Vars(cmd) => vars(ctx, cmd).await?,
        Command::Logs(args) => logs(ctx, args).await?,
        Command::Prefs(cmd) => prefs(ctx, cmd).await?,
        Command::Password(cmd) => match cmd {
            PasswordCommand::Forgot { email } => {
                println!("{}", ctx.api.auth().forgot_password(&email).await?.message);
            }
            PasswordCommand::Reset {
                token,
                new_password,
            } => {
                let auth = ctx.api.auth();
                let _ = auth.verify_reset_token(&token).await?;
                println!("{}", auth.reset_password(&token, &new_password).await?.message);
            }
        },
        Command::Account(cmd) => match cmd {
            AccountCommand::RequestDeletion => {
                println!("{}", ctx.api.auth().request_account_deletion().await?.message);
            }
            AccountCommand::Delete { code } => {
                let _ = ctx.api.auth().delete_account(&code).await?;
                println!("Account deleted.");
            }
        },
        Command::Status => status(ctx).await?,
    }
    Ok(())
}

async fn whoami(ctx: &AppContext) -> Result<()> {
    if ctx.tokens.token().is_none() {
        println!("Not signed in.");
        return Ok(());
    }
    let user = ctx.api.auth().current_user().await?;
    println!("{} <{}>", user.username.as_deref().unwrap_or("-"), user.email);
    if !user.is_verified {
        println!("Email not verified.");
    }
    Ok(())
}

async fn chat(ctx: &AppContext, message: &str, tone: Option<&str>, save: bool) -> Result<()> {
    let resp = ctx.realtime.send_chat(message, tone).await?;
    let reply = match (resp.success, resp.message, resp.error) {
        (true, Some(text), _) => text,
        (_, _, Some(err)) => bail!("chat failed: {err}"),
        _ => bail!("chat failed: empty reply"),
    };
    println!("{reply}");

    if save {
        let transcript = ctx.api.chat_history();
        for entry in [
            SaveChatMessage::new(ChatSender::User, message).with_tone(tone),
            SaveChatMessage::new(ChatSender::Assistant, reply),
        ] {
            if !transcript.save(&entry).await? {
                bail!("backend did not save the chat message");
            }
        }
    }
    Ok(())
}

async fn generate(
    ctx: &AppContext,
    to: &str,
    prompt: &str,
    tone: Option<&str>,
    save: bool,
) -> Result<()> {
    let resp = ctx.realtime.generate_email(to, prompt, tone).await?;
    let Some(email) = resp.email.filter(|_| resp.success) else {
        bail!(
            "email generation failed: {}",
            resp.error.as_deref().unwrap_or("no email returned")
        );
    };
    print_email(&email);

    if save {
        let draft = SaveEmail::from_generated(&email, prompt, tone);
        if ctx.api.emails().save(&draft).await? {
            println!("\nSaved as draft {}.", draft.email_id);
        } else {
            bail!("backend did not save the draft");
        }
    }
    Ok(())
}

async fn history(ctx: &AppContext, args: HistoryArgs) -> Result<()> {
    if args.chat {
        return chat_history(ctx, args).await;
    }
    if args.clear {
        println!("{}", ctx.api.emails().clear().await?.message);
        return Ok(());
    }
    let page = ctx
        .api
        .emails()
        .list(Some(args.limit), args.before.as_deref(), None)
        .await?;
    for record in &page.emails {
        print_record(record);
    }
    println!(
        "{} of {} emails{}",
        page.emails.len(),
        page.total,
        if page.has_more { " (more available)" } else { "" }
    );
    Ok(())
}

async fn chat_history(ctx: &AppContext, args: HistoryArgs) -> Result<()> {
    let transcript = ctx.api.chat_history();
    if args.clear {
        println!("{}", transcript.clear().await?.message);
        return Ok(());
    }
    let page = transcript
        .list(Some(args.limit), args.before.as_deref(), None)
        .await?;
    for msg in &page.messages {
        println!("{}  {:<9} {}", msg.timestamp, msg.sender.as_str(), msg.content);
    }
    println!(
        "{} of {} messages{}",
        page.messages.len(),
        page.total,
        if page.has_more { " (more available)" } else { "" }
    );
    Ok(())
}

async fn configs(ctx: &AppContext, cmd: ConfigsCommand) -> Result<()> {
    let client = ctx.api.email_configs();
    match cmd {
        ConfigsCommand::List => {
            let active = client.active().await?.map(|c| c.email);
            for config in client.list().await? {
                let marker = if active.as_deref() == Some(config.email.as_str()) { "*" } else { " " };
                println!("{marker} {}", config.email);
            }
        }
        ConfigsCommand::Active => match client.active().await? {
            Some(config) => println!("{}", config.email),
            None => println!("No active mailbox."),
        },
        ConfigsCommand::Add { email, password } => {
            println!("{}", client.create(&email, &password).await?.message);
        }
        ConfigsCommand::Remove { email } => {
            println!("{}", client.delete(&email).await?.message);
        }
        ConfigsCommand::Activate { email } => {
            println!("{}", client.set_active(&email).await?.message);
        }
    }
    Ok(())
}

async fn vars(ctx: &AppContext, cmd: VarsCommand) -> Result<()> {
    let client = ctx.api.env_vars();
    match cmd {
        VarsCommand::List => {
            for var in client.list().await? {
                println!("{}={}", var.key, var.value);
            }
        }
        VarsCommand::Get { key } => println!("{}", client.get(&key).await?.value),
        VarsCommand::Set { key, value } => {
            let saved = client.create(&key, &value).await?;
            match saved.variable {
                Some(var) => println!("{}={}", var.key, var.masked_value),
                None => println!("{}", saved.message.unwrap_or_default()),
            }
        }
        VarsCommand::Delete { key } => println!("{}", client.delete(&key).await?.message),
    }
    Ok(())
}

async fn logs(ctx: &AppContext, args: LogsArgs) -> Result<()> {
    let client = ctx.api.logs();
    if let Some(days) = args.cleanup {
        println!("{}", client.cleanup(days).await?.message);
        return Ok(());
    }
    if args.stats {
        let stats = client.stats().await?;
        println!(
            "total {}  critical {}  error {}  warning {}  info {}  debug {}",
            stats.total_logs,
            stats.critical_count,
            stats.error_count,
            stats.warning_count,
            stats.info_count,
            stats.debug_count
        );
        for (category, count) in &stats.category_breakdown {
            println!("  {category}: {count}");
        }
        return Ok(());
    }
    let filters = LogFilters {
        level: args.level,
        category: args.category,
        search_term: args.search,
        limit: Some(args.limit),
        ..Default::default()
    };
    for entry in client.query(&filters).await? {
        println!("{} {:<8} {:<9} {}", entry.timestamp, entry.level, entry.category, entry.message);
    }
    Ok(())
}

async fn prefs(ctx: &AppContext, cmd: PrefsCommand) -> Result<()> {
    let auth = ctx.api.auth();
    let prefs = match cmd {
        PrefsCommand::Show => auth.preferences().await?,
        PrefsCommand::Set {
            language,
            tone,
            ai_learning,
            save_history,
        } => {
            let update = Preferences {
                language,
                default_tone: tone,
                ai_learning,
                save_history,
            };
            if update == Preferences::default() {
                bail!("nothing to change; pass at least one of --language, --tone, --ai-learning, --save-history");
            }
            auth.update_preferences(&update).await?
        }
    };
    println!("language:     {}", prefs.language.as_deref().unwrap_or("-"));
    println!("default tone: {}", prefs.default_tone.as_deref().unwrap_or("-"));
    println!("ai learning:  {}", flag(prefs.ai_learning));
    println!("save history: {}", flag(prefs.save_history));
    Ok(())
}

async fn status(ctx: &AppContext) -> Result<()> {
    println!("API:       {}", ctx.settings.api_url);
    match ctx.api.health().await {
        Ok(s) => println!("Backend:   {}", s.status),
        Err(e) => println!("Backend:   unreachable ({e})"),
    }
    let logging = ctx.api.logs().status().await?;
    println!(
        "Logging:   database {}, file {}",
        if logging.database_available { "up" } else { "down" },
        if logging.file_logging { "on" } else { "off" }
    );
    println!("Realtime:  {}", ctx.settings.ws_url);
    match ctx.realtime.ensure_connected().await {
        Ok(()) => println!("Socket:    {}", ctx.realtime.state()),
        Err(e) => println!("Socket:    {} ({e})", ctx.realtime.state()),
    }
    println!(
        "Session:   {}",
        if ctx.tokens.token().is_some() { "signed in" } else { "signed out" }
    );
    Ok(())
}

fn flag(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "on",
        Some(false) => "off",
        None => "-",
    }
}

fn print_email(email: &GeneratedEmail) {
    println!("To:      {}", email.to);
    println!("Subject: {}", email.subject);
    println!();
    println!("{}", email.body);
}

fn print_record(record: &EmailRecord) {
    println!(
        "{}  {:<7} {}  {}",
        record.timestamp,
        record.status.as_str(),
        record.to_email,
        record.subject
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mailagent_realtime::testing::{MemoryPeer, MemoryTransport};
    use mailagent_settings::ClientSettings;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Setup {
        ctx: AppContext,
        transport: Arc<MemoryTransport>,
        server: MockServer,
        _dir: TempDir,
    }

    async fn setup() -> Setup {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = ClientSettings {
            api_url: format!("{}/api", server.uri()),
            data_dir: Some(dir.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        let transport = Arc::new(MemoryTransport::new());
        let ctx = AppContext::with_transport(settings, transport.clone()).unwrap();
        Setup {
            ctx,
            transport,
            server,
            _dir: dir,
        }
    }

    /// Answer the next realtime frame with `reply(frame)`, keeping the peer
    /// open until the returned handle is awaited.
    fn answer_once(
        transport: &Arc<MemoryTransport>,
        reply: impl FnOnce(&Value) -> Value + Send + 'static,
    ) -> tokio::task::JoinHandle<MemoryPeer> {
        let transport = Arc::clone(transport);
        tokio::spawn(async move {
            let mut peer = transport.accept().await.unwrap();
            let frame = peer.next_frame().await.unwrap();
            assert!(peer.reply(&reply(&frame)));
            peer
        })
    }

    #[test]
    fn flag_labels() {
        assert_eq!(flag(Some(true)), "on");
        assert_eq!(flag(Some(false)), "off");
        assert_eq!(flag(None), "-");
    }

    #[tokio::test]
    async fn generate_and_save_stores_draft() {
        let s = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/emails"))
            .and(body_partial_json(json!({
                "to_email": "bob@example.com",
                "subject": "Quarterly report",
                "body": "Please find it attached.",
                "prompt": "send the report",
                "tone": "formal",
                "status": "draft"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&s.server)
            .await;
        let peer = answer_once(&s.transport, |frame| {
            assert_eq!(frame["type"], "email");
            json!({
                "requestId": frame["requestId"],
                "success": true,
                "email": {
                    "to": frame["receiverEmail"],
                    "subject": "Quarterly report",
                    "body": "Please find it attached."
                }
            })
        });

        generate(&s.ctx, "bob@example.com", "send the report", Some("formal"), true)
            .await
            .unwrap();

        let _peer = peer.await.unwrap();
        s.ctx.shutdown();
    }

    #[tokio::test]
    async fn failed_generation_saves_nothing() {
        let s = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(0)
            .mount(&s.server)
            .await;
        let peer = answer_once(&s.transport, |frame| {
            json!({"requestId": frame["requestId"], "success": false, "error": "model overloaded"})
        });

        let err = generate(&s.ctx, "bob@example.com", "send the report", None, true)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("model overloaded"));
        let _peer = peer.await.unwrap();
        s.ctx.shutdown();
    }

    #[tokio::test]
    async fn chat_with_save_records_both_sides() {
        let s = setup().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/messages"))
            .and(body_partial_json(json!({"sender": "user", "content": "hello", "tone": "casual"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&s.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat/messages"))
            .and(body_partial_json(json!({"sender": "assistant", "content": "hi there"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&s.server)
            .await;
        let peer = answer_once(&s.transport, |frame| {
            json!({"requestId": frame["requestId"], "role": "assistant", "content": "hi there"})
        });

        chat(&s.ctx, "hello", Some("casual"), true).await.unwrap();

        let _peer = peer.await.unwrap();
        s.ctx.shutdown();
    }
}
