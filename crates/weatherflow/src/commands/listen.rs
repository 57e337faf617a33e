//! `weatherflow listen`: subscribe to station devices and print events.

use strum::IntoEnumIterator;

use weatherflow_api::{MessageKind, Request, WebsocketClient};

use crate::cli::{GlobalOpts, ListenArgs};
use crate::config;
use crate::error::CliError;
use crate::output::EventPrinter;

pub async fn handle(args: ListenArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ws_config = config::build_websocket_config(global, &args.devices)?;
    if ws_config.devices.is_empty() {
        return Err(CliError::Validation {
            field: "device".into(),
            reason: "no devices given; pass --device or add `devices` to the profile".into(),
        });
    }

    let client = WebsocketClient::new(ws_config)?;
    let printer = EventPrinter::new(global.output, global.color);

    for kind in MessageKind::iter().filter(|k| *k != MessageKind::Acknowledgement) {
        client.on(kind, move |message| printer.print(&message));
    }
    client.on_invalid(|frame| {
        tracing::warn!(reason = %frame.reason, raw = %frame.raw, "undecodable frame");
    });

    let rapid_wind = args.rapid_wind;
    super::stream_until_stopped(&client, args.duration, || async {
        for device in &client.config().devices {
            let ack = client
                .send_and_await_ack(&Request::listen_start(*device), None)
                .await?;
            tracing::info!(device_id = %device, id = %ack.id, "observation stream started");

            if rapid_wind {
                let ack = client
                    .send_and_await_ack(&Request::rapid_wind_start(*device), None)
                    .await?;
                tracing::info!(device_id = %device, id = %ack.id, "rapid wind stream started");
            }
        }
        Ok(())
    })
    .await
}
