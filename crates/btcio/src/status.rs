use tapnet_status::StatusChannel;

#[derive(Debug, Clone)]
pub enum ChainStatusUpdate {
    CurHeight(u64),
    CurTip(String),
    LastUpdate(u64),
    RpcConnected(bool),
    RpcError(String),
}

pub fn apply_status_updates(updates: &[ChainStatusUpdate], status_channel: &StatusChannel) {
    let mut status = status_channel.chain_status();
    for event in updates {
        match event {
            ChainStatusUpdate::CurHeight(height) => status.cur_height = *height,
            ChainStatusUpdate::CurTip(tip) => status.cur_tip = tip.clone(),
            ChainStatusUpdate::LastUpdate(epoch_time) => status.last_update = *epoch_time,
            ChainStatusUpdate::RpcConnected(connected) => status.rpc_connected = *connected,
            ChainStatusUpdate::RpcError(err) => status.last_rpc_error = Some(err.clone()),
        }
    }
    status_channel.update_chain_status(status);
}
