use ax_update_model::DisplayState;

/// What the core tells the presentation layer. Implementations decide how
/// (DOM, terminal, test recorder); the core only decides what.
pub trait RenderingBridge: Send + Sync {
    /// Hide the preparation form and show the payment panel.
    fn enter_payment_mode(&self);

    fn render(&self, state: &DisplayState);

    /// Show or hide the "waiting for payment" indicator.
    fn set_pending_indicator(&self, visible: bool);

    /// Remove the address and QR code.
    fn clear_payment_details(&self);

    /// Non-blocking notice that the stream is gone for good. Any payment
    /// already sent is still processed by the server.
    fn notify_connection_lost(&self);
}
