use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::info;

use zcb_core::{
    config::Config,
    dispatcher::CommandHandler,
    domain::UserId,
    meeting::MeetingService,
    oauth::OAuthFlow,
    ports::{MeetingProvider, Ports},
    preferences::KvPreferenceStore,
    store::KvStore,
    telemetry::Telemetry,
};

use crate::{handlers, TelegramPlatform};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub platform: Arc<TelegramPlatform>,
    pub commands: Arc<CommandHandler>,
    pub meetings: Arc<MeetingService>,
    /// Entry point for whatever serves the OAuth redirect.
    pub oauth: Arc<OAuthFlow>,
    /// Bot username without `@`, for `/zoom@bot` commands in groups.
    pub bot_username: String,
}

/// Non-Telegram adapters the bot is wired with.
pub struct Adapters {
    pub provider: Arc<dyn MeetingProvider>,
    pub kv: Arc<dyn KvStore>,
    pub telemetry: Arc<dyn Telemetry>,
}

pub async fn build_state(mut cfg: Config, adapters: Adapters) -> anyhow::Result<Arc<AppState>> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let me = bot.get_me().await?;
    cfg.bot_user_id = UserId(me.id.0 as i64);
    let bot_username = me.username().to_string();
    let cfg = Arc::new(cfg);

    let platform = Arc::new(TelegramPlatform::new(bot, cfg.clone()));
    let ports = Ports {
        platform: platform.clone(),
        provider: adapters.provider,
        preferences: Arc::new(KvPreferenceStore::new(adapters.kv.clone())),
        kv: adapters.kv,
        telemetry: adapters.telemetry,
    };

    let meetings = Arc::new(MeetingService::new(cfg.clone(), ports.clone()));
    let commands = Arc::new(CommandHandler::with_meetings(
        cfg.clone(),
        ports.clone(),
        meetings.clone(),
    ));
    let oauth = Arc::new(OAuthFlow::new(cfg.clone(), ports, meetings.clone()));

    Ok(Arc::new(AppState {
        cfg,
        platform,
        commands,
        meetings,
        oauth,
        bot_username,
    }))
}

pub async fn run_polling(state: Arc<AppState>) -> anyhow::Result<()> {
    let bot = state.platform.bot();
    info!(
        bot = %state.bot_username,
        oauth = state.cfg.oauth_enabled,
        account_level = state.cfg.account_level_app,
        "zcb started"
    );

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
