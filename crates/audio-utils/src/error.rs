#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] rodio::decoder::DecoderError),

    #[error(transparent)]
    Wav(#[from] hound::Error),
}
