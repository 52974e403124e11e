use std::env;

use log::{error, info};

use messenger_client::Session;
use messenger_client::integration::Config;
use messenger_client::user::model::UserInfo;

#[tokio::main]
async fn main() {
    let config = Config::default();

    let Ok(user_id) = env::var("USER_ID") else {
        error!("USER_ID must be set");
        return;
    };
    let user = UserInfo::new(user_id.as_str(), env::var("USER_NAME").unwrap_or_default());

    let session = match Session::open(&config, user).await {
        Ok(session) => session,
        Err(e) => {
            error!("failed to open session: {e:?}");
            return;
        }
    };

    render(&session).await;

    let mut updated = session.inbox().updated();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            changed = updated.changed() => {
                if changed.is_err() {
                    break;
                }
                render(&session).await;
            }
        }
    }

    session.close().await;
}

async fn render(session: &Session) {
    for conversation in session.inbox().snapshot().await {
        info!(
            "{} | {} unread | {}",
            conversation.counterpart_name(),
            conversation.unread_count(),
            conversation.last_message().unwrap_or("-"),
        );
    }
}
