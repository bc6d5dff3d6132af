pub mod card_writer;
