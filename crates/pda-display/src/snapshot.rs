use pda_snapshot::{ByteReader, ByteWriter, IoSnapshot, SnapshotError};

use crate::registers::{RAM_PADDED_SIZE, REGISTER_COUNT};
use crate::sed1376::Sed1376;

/// `registers || rLut || gLut || bLut || ram`, no header. `outputLut` is derived, not stored.
impl IoSnapshot for Sed1376 {
    fn state_size(&self) -> usize {
        REGISTER_COUNT + 256 * 3 + RAM_PADDED_SIZE
    }

    fn save_state(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(self.state_size());
        w.write_bytes(&self.registers);
        w.write_bytes(&self.r_lut);
        w.write_bytes(&self.g_lut);
        w.write_bytes(&self.b_lut);
        w.write_bytes(&self.ram);
        w.into_vec()
    }

    fn load_state(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let mut r = ByteReader::new(data);
        r.read_into(&mut self.registers)?;
        r.read_into(&mut self.r_lut)?;
        r.read_into(&mut self.g_lut)?;
        r.read_into(&mut self.b_lut)?;
        r.read_into(&mut self.ram)?;
        self.regenerate_output_lut();
        Ok(())
    }
}
