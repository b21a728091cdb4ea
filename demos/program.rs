use std::fs::{self, File};

use amiikit::Result;
use amiikit::codec::unpack_to_vec;
use amiikit::formats::amiibo::{AMIIBO_SIZE, AmiiboData, pad_dump};
use amiikit::keys::KeySet;

fn main() -> Result<()> {
    let keys = KeySet::load_retail(File::open("key_retail.bin")?)?;

    let dump = pad_dump(&fs::read("figure.bin")?)?;
    let plain: [u8; AMIIBO_SIZE] = unpack_to_vec(&keys, &dump)?
        .try_into()
        .map_err(|_| amiikit::Error::Parse("unexpected output length"))?;

    let amiibo = AmiiboData::parse(&plain)?;
    println!("amiibo id: {}", amiibo.amiibo_id);
    println!("nickname:  {}", amiibo.nickname);

    Ok(())
}
