mod app;
mod handler;
mod tui;
mod ui;

use anyhow::Result;
use app::App;
use geeta_core::{ChatUpdate, Config};
use tui::{AppEvent, EventHandler};

enum Step {
    Event(Option<AppEvent>),
    Update(Option<ChatUpdate>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let mut app = App::new(config.server_url());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            let pending = app.session.is_pending();
            let step = tokio::select! {
                event = events.next() => Step::Event(event),
                update = app.session.next_update(), if pending => Step::Update(update),
            };

            match step {
                Step::Event(Some(event)) => handler::handle_event(&mut app, event),
                Step::Event(None) => break,
                Step::Update(Some(update)) => {
                    app.on_update(update);
                    // Apply fragments that queued up during the redraw
                    for update in app.session.drain_updates() {
                        app.on_update(update);
                    }
                }
                Step::Update(None) => {}
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}
