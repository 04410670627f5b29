use image::RgbaImage;

use crate::bitmap::{PrintLine, render_lines};
use crate::config::{JobOptions, LineMode, PrinterConfig};
use crate::dithering::ContentClass;
use crate::error::{Error, Result};
use crate::protocol::*;
use crate::transport::{PauseFlag, Sink, TransportBuffer};

/// Resolution byte sent by `set_dpi`; the firmware only knows this one.
const DPI_200: u64 = 50;

/// Speed the printer is left at after a job.
const IDLE_SPEED: u8 = 8;

/// Where a session is in the print sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Preparing,
    Printing,
    Finishing,
}

/// Device flags reported by a GetDeviceState frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState(u8);

impl DeviceState {
    pub const OUT_OF_PAPER: u8 = 1 << 0;
    pub const COVER_OPEN: u8 = 1 << 1;
    pub const OVERHEAT: u8 = 1 << 2;
    pub const LOW_POWER: u8 = 1 << 3;
    pub const PAUSED: u8 = 1 << 4;
    pub const BUSY: u8 = 0x80;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn out_of_paper(self) -> bool {
        self.0 & Self::OUT_OF_PAPER != 0
    }

    pub fn cover_open(self) -> bool {
        self.0 & Self::COVER_OPEN != 0
    }

    pub fn overheat(self) -> bool {
        self.0 & Self::OVERHEAT != 0
    }

    pub fn low_power(self) -> bool {
        self.0 & Self::LOW_POWER != 0
    }

    pub fn paused(self) -> bool {
        self.0 & Self::PAUSED != 0
    }

    pub fn busy(self) -> bool {
        self.0 & Self::BUSY != 0
    }

    /// No flag that stops printing is set. Low power alone does not.
    pub fn is_ready(self) -> bool {
        let blocking =
            Self::OUT_OF_PAPER | Self::COVER_OPEN | Self::OVERHEAT | Self::PAUSED | Self::BUSY;
        self.0 & blocking == 0
    }

    fn with(self, flag: u8, on: bool) -> Self {
        if on { Self(self.0 | flag) } else { Self(self.0 & !flag) }
    }
}

/// GB03 and the MX series are the newer firmware generation.
pub fn is_new_model(model: &str) -> bool {
    model == "GB03" || model.starts_with("MX")
}

/// One print session over one exclusively owned sink.
///
/// Calls must follow `prepare`, `draw_line`..., `finish`. There is no
/// abort command, so a caller bailing out midway should still call
/// `finish` before dropping the sink.
pub struct PrinterSession<S> {
    transport: TransportBuffer<S>,
    state: DeviceState,
    phase: SessionPhase,
    config: PrinterConfig,
}

impl<S: Sink> PrinterSession<S> {
    pub fn new(sink: S, config: PrinterConfig) -> Result<Self> {
        config.validate()?;
        let mtu = config.mtu.unwrap_or_else(|| sink.mtu());
        let transport =
            TransportBuffer::new(sink, mtu, config.write_delay, config.pause_poll_interval)?;
        Ok(Self {
            transport,
            state: DeviceState::default(),
            phase: SessionPhase::Idle,
            config,
        })
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Last reported device flags. The paused bit always reflects the
    /// shared [`PauseFlag`], whoever set it last.
    pub fn device_state(&self) -> DeviceState {
        self.state
            .with(DeviceState::PAUSED, self.transport.pause_flag().is_paused())
    }

    pub fn is_new_model(&self) -> bool {
        is_new_model(&self.config.model)
    }

    /// Whether the model accepts compressed bitmap frames. Nothing here
    /// emits them; every line is sent uncompressed.
    pub fn compression_supported(&self) -> bool {
        self.is_new_model()
    }

    /// Handle on the pause flag for a notification reader. Setting it is
    /// the same as a state report with only the paused bit changed.
    pub fn pause_flag(&self) -> PauseFlag {
        self.transport.pause_flag()
    }

    pub fn sink(&self) -> &S {
        self.transport.sink()
    }

    pub fn into_sink(self) -> S {
        self.transport.into_sink()
    }

    /// Replaces the device state and mirrors its pause bit to the transport.
    ///
    /// A report from the device wins over an earlier local `pause`.
    pub fn update_state(&mut self, state: DeviceState) {
        let old = self.device_state();
        if state != old {
            log::debug!("device state {:#04x} -> {:#04x}", old.bits(), state.bits());
        }
        self.state = state.with(DeviceState::PAUSED, false);
        self.transport.pause_flag().set(state.paused());
    }

    /// Feeds a notification frame from the printer into the session.
    ///
    /// Returns the new device state if the frame was a state report.
    pub fn handle_notification(&mut self, data: &[u8]) -> Result<Option<DeviceState>> {
        let frame = Frame::decode(data)?;
        match (frame.command(), frame.payload.first()) {
            (Some(Command::GetDeviceState), Some(&bits)) => {
                let state = DeviceState::from_bits(bits);
                self.update_state(state);
                Ok(Some(state))
            }
            _ => {
                log::trace!("ignoring notification {:#04x}", frame.command);
                Ok(None)
            }
        }
    }

    /// Sends the pause frame out of band and holds further flushes.
    pub async fn pause(&mut self) -> Result<()> {
        self.transport.write_direct(&PAUSE_FRAME).await?;
        self.transport.pause_flag().set(true);
        Ok(())
    }

    /// Sends the resume frame out of band and releases held flushes.
    pub async fn resume(&mut self) -> Result<()> {
        self.transport.write_direct(&RESUME_FRAME).await?;
        self.transport.pause_flag().set(false);
        Ok(())
    }

    async fn send(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(command, CommandType::Transfer, payload)?;
        self.transport.enqueue(&frame).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.transport.flush().await
    }

    pub async fn get_device_state(&mut self) -> Result<()> {
        self.send(Command::GetDeviceState, &int_to_bytes(0, 1, false)).await
    }

    pub async fn get_device_info(&mut self) -> Result<()> {
        self.send(Command::GetDeviceInfo, &int_to_bytes(0, 1, false)).await
    }

    pub async fn update_device(&mut self) -> Result<()> {
        self.send(Command::UpdateDevice, &int_to_bytes(0, 1, false)).await
    }

    /// Selects 200 dpi, the only resolution these heads have.
    pub async fn set_dpi(&mut self) -> Result<()> {
        self.send(Command::SetDpi, &int_to_bytes(DPI_200, 1, false)).await
    }

    pub async fn set_speed(&mut self, speed: u8) -> Result<()> {
        self.send(Command::SetSpeed, &int_to_bytes(speed.into(), 1, false)).await
    }

    pub async fn set_energy(&mut self, energy: u16) -> Result<()> {
        self.send(Command::SetEnergy, &int_to_bytes(energy.into(), 2, false)).await
    }

    pub async fn apply_energy(&mut self) -> Result<()> {
        self.send(Command::ApplyEnergy, &int_to_bytes(1, 1, false)).await
    }

    pub async fn start_lattice(&mut self) -> Result<()> {
        self.send(Command::Lattice, &LATTICE_START).await
    }

    pub async fn end_lattice(&mut self) -> Result<()> {
        self.send(Command::Lattice, &LATTICE_END).await
    }

    pub async fn feed(&mut self, points: u16) -> Result<()> {
        self.send(Command::Feed, &int_to_bytes(points.into(), 2, false)).await
    }

    pub async fn retract(&mut self, points: u16) -> Result<()> {
        self.send(Command::Retract, &int_to_bytes(points.into(), 2, false)).await
    }

    pub async fn prepare_camera(&mut self) -> Result<()> {
        self.transport.enqueue(&PREPARE_CAMERA).await
    }

    fn enter(&mut self, phase: SessionPhase) {
        log::debug!("session {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Puts the printer into raster mode. The firmware wants exactly this
    /// order.
    pub async fn prepare(&mut self, speed: u8, energy: u16) -> Result<()> {
        if self.phase != SessionPhase::Idle {
            return Err(Error::Sequencing {
                op: "prepare",
                phase: self.phase,
            });
        }
        self.enter(SessionPhase::Preparing);
        self.flush().await?;
        self.get_device_state().await?;
        self.prepare_camera().await?;
        self.set_dpi().await?;
        self.set_speed(speed).await?;
        self.set_energy(energy).await?;
        self.apply_energy().await?;
        self.update_device().await?;
        self.start_lattice().await?;
        self.flush().await?;
        self.enter(SessionPhase::Printing);
        Ok(())
    }

    /// Queues one packed line. Does not flush.
    pub async fn draw_line(&mut self, line: &[u8], mode: LineMode) -> Result<()> {
        if self.phase != SessionPhase::Printing {
            return Err(Error::Sequencing {
                op: "draw a line",
                phase: self.phase,
            });
        }
        if line.len() != self.config.line_bytes() {
            return Err(Error::Configuration(format!(
                "line is {} bytes, paper width {} needs {}",
                line.len(),
                self.config.paper_width,
                self.config.line_bytes()
            )));
        }
        match mode {
            LineMode::Standard => self.send(Command::Bitmap, line).await,
            LineMode::Pbm => {
                let reversed: Vec<u8> = line.iter().map(|&b| reverse_bits(b)).collect();
                self.send(Command::Bitmap, &reversed).await
            }
        }
    }

    pub async fn draw_lines(&mut self, lines: &[PrintLine], mode: LineMode) -> Result<()> {
        for (i, line) in lines.iter().enumerate() {
            self.draw_line(line, mode).await?;
            if i % 50 == 0 {
                log::debug!("line {}/{}", i + 1, lines.len());
            }
        }
        Ok(())
    }

    /// Leaves raster mode and feeds `extra_feed` dots.
    ///
    /// Accepted from any phase so an aborted job can still be closed.
    pub async fn finish(&mut self, extra_feed: u16) -> Result<()> {
        self.enter(SessionPhase::Finishing);
        self.flush().await?;
        self.end_lattice().await?;
        self.set_speed(IDLE_SPEED).await?;
        self.feed(extra_feed).await?;
        self.get_device_state().await?;
        self.flush().await?;
        self.enter(SessionPhase::Idle);
        Ok(())
    }

    /// Runs a whole job: normalize, dither, pack, prepare, draw, finish.
    ///
    /// If preparing or drawing fails partway, `finish` is still attempted
    /// and the first error is returned. A session that was not idle is left
    /// alone.
    pub async fn print_raster(
        &mut self,
        raster: &RgbaImage,
        class: ContentClass,
        options: &JobOptions,
    ) -> Result<()> {
        let lines = render_lines(raster, class, &self.config)?;
        log::debug!("printing {} lines ({:?})", lines.len(), class);
        let drawn = match self.prepare(options.speed, options.energy).await {
            Ok(()) => self.draw_lines(&lines, options.line_mode).await,
            Err(e) if self.phase == SessionPhase::Preparing => Err(e),
            Err(e) => return Err(e),
        };
        if let Err(e) = &drawn {
            log::warn!("job failed in {:?} ({e}), closing it", self.phase);
        }
        let finished = self.finish(options.extra_feed).await;
        drawn.and(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::Recorder;

    fn session(model: &str) -> PrinterSession<Recorder> {
        let config = PrinterConfig {
            model: model.to_string(),
            paper_width: 16,
            ..PrinterConfig::default()
        };
        PrinterSession::new(Recorder::default(), config).unwrap()
    }

    fn frame(command: Command, payload: &[u8]) -> Vec<u8> {
        encode_frame(command, CommandType::Transfer, payload).unwrap()
    }

    fn prepare_bytes(speed: u8, energy: u16) -> Vec<u8> {
        [
            frame(Command::GetDeviceState, &[0]),
            PREPARE_CAMERA.to_vec(),
            frame(Command::SetDpi, &[50]),
            frame(Command::SetSpeed, &[speed]),
            frame(Command::SetEnergy, &energy.to_le_bytes()),
            frame(Command::ApplyEnergy, &[1]),
            frame(Command::UpdateDevice, &[0]),
            frame(Command::Lattice, &LATTICE_START),
        ]
        .concat()
    }

    fn finish_bytes(feed: u16) -> Vec<u8> {
        [
            frame(Command::Lattice, &LATTICE_END),
            frame(Command::SetSpeed, &[8]),
            frame(Command::Feed, &feed.to_le_bytes()),
            frame(Command::GetDeviceState, &[0]),
        ]
        .concat()
    }

    #[test]
    fn test_model_gating() {
        assert!(is_new_model("GB03"));
        assert!(is_new_model("MX10"));
        assert!(!is_new_model("GB01"));
        assert!(!is_new_model("gb03"));
        let s = session("MX06");
        assert!(s.is_new_model());
        assert!(s.compression_supported());
        assert!(!session("GB02").compression_supported());
    }

    #[test]
    fn test_device_state_flags() {
        let s = DeviceState::from_bits(0x81);
        assert!(s.out_of_paper());
        assert!(s.busy());
        assert!(!s.cover_open());
        assert!(!s.is_ready());
        assert!(DeviceState::from_bits(DeviceState::LOW_POWER).is_ready());
        assert!(DeviceState::from_bits(0x10).paused());
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = PrinterConfig {
            paper_width: 100,
            ..PrinterConfig::default()
        };
        assert!(matches!(
            PrinterSession::new(Recorder::default(), config),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_sequence() {
        let mut s = session("GB01");
        s.prepare(35, 8000).await.unwrap();
        assert_eq!(s.phase(), SessionPhase::Printing);
        assert_eq!(s.sink().writes, vec![prepare_bytes(35, 8000)]);
        // spot check the literal wire bytes of the speed frame
        let speed = frame(Command::SetSpeed, &[35]);
        assert_eq!(speed, vec![0x51, 0x78, 0xbd, 0x00, 0x01, 0x00, 0x23, 0xe9, 0xff]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_draw_line_is_buffered() {
        let mut s = session("GB01");
        s.prepare(35, 8000).await.unwrap();
        s.draw_line(&[0x01, 0x80], LineMode::Standard).await.unwrap();
        s.draw_line(&[0x01, 0x80], LineMode::Pbm).await.unwrap();
        assert_eq!(s.sink().writes.len(), 1);

        s.finish(50).await.unwrap();
        let writes = &s.sink().writes;
        assert_eq!(writes.len(), 3);
        assert_eq!(
            writes[1],
            [
                frame(Command::Bitmap, &[0x01, 0x80]),
                frame(Command::Bitmap, &[0x80, 0x01]),
            ]
            .concat()
        );
        assert_eq!(writes[2], finish_bytes(50));
        assert_eq!(s.phase(), SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_draw_line_requires_prepare() {
        let mut s = session("GB01");
        let err = s.draw_line(&[0, 0], LineMode::Standard).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Sequencing {
                phase: SessionPhase::Idle,
                ..
            }
        ));

        s.prepare(35, 8000).await.unwrap();
        s.finish(0).await.unwrap();
        assert!(s.draw_line(&[0, 0], LineMode::Standard).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_draw_line_checks_width() {
        let mut s = session("GB01");
        s.prepare(35, 8000).await.unwrap();
        let err = s.draw_line(&[0, 0, 0], LineMode::Standard).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_twice_is_rejected() {
        let mut s = session("GB01");
        s.prepare(35, 8000).await.unwrap();
        assert!(matches!(
            s.prepare(35, 8000).await,
            Err(Error::Sequencing { op: "prepare", .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_without_prepare() {
        let mut s = session("GB01");
        s.finish(50).await.unwrap();
        assert_eq!(s.sink().writes, vec![finish_bytes(50)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume_frames() {
        let mut s = session("GB01");
        s.pause().await.unwrap();
        assert!(s.pause_flag().is_paused());
        assert!(s.device_state().paused());
        s.resume().await.unwrap();
        assert!(!s.pause_flag().is_paused());
        assert_eq!(
            s.sink().writes,
            vec![PAUSE_FRAME.to_vec(), RESUME_FRAME.to_vec()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_drives_pause() {
        let mut s = session("GB01");
        let state = s.handle_notification(&PAUSE_FRAME).unwrap();
        assert_eq!(state, Some(DeviceState::from_bits(0x10)));
        assert!(s.pause_flag().is_paused());

        s.handle_notification(&RESUME_FRAME).unwrap();
        assert!(!s.pause_flag().is_paused());
        assert!(s.device_state().is_ready());

        let info = frame(Command::GetDeviceInfo, &[1, 2, 3]);
        assert_eq!(s.handle_notification(&info).unwrap(), None);
        assert!(s.handle_notification(&[0x51, 0x78]).is_err());
    }

    #[test]
    fn test_reader_flag_and_device_state_agree() {
        let mut s = session("GB01");
        s.update_state(DeviceState::from_bits(DeviceState::PAUSED | DeviceState::LOW_POWER));
        assert!(!s.device_state().is_ready());

        // a notification reader clears the shared flag directly
        s.pause_flag().set(false);
        assert!(!s.device_state().paused());
        assert!(s.device_state().low_power());
        assert!(s.device_state().is_ready());

        s.pause_flag().set(true);
        assert!(s.device_state().paused());
        assert_eq!(s.device_state().bits(), 0x18);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_report_overrides_local_pause() {
        let mut s = session("GB01");
        s.pause().await.unwrap();
        let idle = frame(Command::GetDeviceState, &[0]);
        s.handle_notification(&idle).unwrap();
        assert!(!s.pause_flag().is_paused());
        assert!(!s.device_state().paused());
    }

    #[test]
    fn test_rejects_zero_sink_mtu() {
        struct NoRoom;

        #[async_trait::async_trait]
        impl Sink for NoRoom {
            async fn write(&mut self, _: &[u8]) -> Result<()> {
                Ok(())
            }

            fn mtu(&self) -> usize {
                0
            }
        }

        let res = PrinterSession::new(NoRoom, PrinterConfig::default());
        assert!(matches!(res, Err(Error::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_print_raster_leaves_busy_session_alone() {
        let mut s = session("GB01");
        s.prepare(35, 8000).await.unwrap();
        let before = s.sink().writes.len();
        let img = RgbaImage::new(16, 2);
        let err = s
            .print_raster(&img, ContentClass::Text, &JobOptions::text())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sequencing { op: "prepare", .. }));
        assert_eq!(s.phase(), SessionPhase::Printing);
        assert_eq!(s.sink().writes.len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_propagates() {
        let mut s = session("GB01");
        s.prepare(35, 8000).await.unwrap();
        s.draw_line(&[0xff, 0xff], LineMode::Standard).await.unwrap();
        s.transport.sink_mut().fail = true;
        let err = s.finish(10).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(s.phase(), SessionPhase::Finishing);
    }
}
