//! `weatherflow strikes`: geofenced lightning strike stream.

use weatherflow_api::{MessageKind, Request, StrikeType, WebsocketClient};

use crate::cli::{GlobalOpts, StrikesArgs};
use crate::config;
use crate::error::CliError;
use crate::output::EventPrinter;

pub async fn handle(args: StrikesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    validate_box(&args)?;

    // Strike streams are not device-scoped: nothing to stop on close.
    let ws_config = config::build_websocket_config(global, &[])?.with_devices([]);
    let client = WebsocketClient::new(ws_config)?;
    let printer = EventPrinter::new(global.output, global.color);

    client.on(MessageKind::LightningStrike, move |message| printer.print(&message));

    let request = Request::geo_strike_start(
        args.lat_min,
        args.lat_max,
        args.lon_min,
        args.lon_max,
        args.strike_type.map(StrikeType::from),
    );
    super::stream_until_stopped(&client, args.duration, || async {
        let ack = client.send_and_await_ack(&request, None).await?;
        tracing::info!(id = %ack.id, "strike stream started");
        Ok(())
    })
    .await
}

fn validate_box(args: &StrikesArgs) -> Result<(), CliError> {
    let check = |field: &str, min: f64, max: f64, limit: f64| {
        if !(-limit..=limit).contains(&min) || !(-limit..=limit).contains(&max) {
            return Err(CliError::Validation {
                field: field.into(),
                reason: format!("values must be within ±{limit}"),
            });
        }
        if min > max {
            return Err(CliError::Validation {
                field: field.into(),
                reason: format!("minimum {min} is greater than maximum {max}"),
            });
        }
        Ok(())
    };
    check("latitude", args.lat_min, args.lat_max, 90.0)?;
    check("longitude", args.lon_min, args.lon_max, 180.0)
}
