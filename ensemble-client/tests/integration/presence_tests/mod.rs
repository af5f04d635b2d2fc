mod test_instrument_change;
mod test_lost_relay_connection;
mod test_microphone_streams;
