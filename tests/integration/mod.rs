mod custom_outbound;
