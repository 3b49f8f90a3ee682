use heapless::Vec;
use log::{debug, info, warn};

use super::frame::{decode, encode, FrameError, FrameType, MAX_FOPTS_SIZE, MAX_PAYLOAD_SIZE};
use super::region::RegionalPlan;
use super::timing::{Timer, TimingParams};
use crate::config::device::{AESKey, Session};
use crate::config::radio::{ConfigError, DeviceClass, FPort, RadioConfiguration};
use crate::crypto::{self, Direction, MIC_SIZE};
use crate::radio::traits::{LinkSettings, Mode, PackageStatus, RxMode, Transceiver};

/// MAC layer error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacError<E> {
    /// Radio error
    Radio(E),
    /// Uplink could not be encoded
    Frame(FrameError),
    /// Rejected configuration
    Config(ConfigError),
    /// A cycle is in progress
    Busy,
    /// Nothing to poll: no cycle running and not listening continuously
    NotListening,
}

impl<E> From<FrameError> for MacError<E> {
    fn from(e: FrameError) -> Self {
        MacError::Frame(e)
    }
}

impl<E> From<ConfigError> for MacError<E> {
    fn from(e: ConfigError) -> Self {
        MacError::Config(e)
    }
}

/// Where a cycle stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacState {
    /// Ready for an uplink
    Idle,
    /// Uplink on the air
    Sending,
    /// Waiting for or listening in RX1
    AwaitingRx1,
    /// Waiting for or listening in RX2
    AwaitingRx2,
}

/// Receive window a downlink arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Window {
    /// First window, uplink channel and data rate
    Rx1,
    /// Second window, downlink channel and data rate
    Rx2,
    /// Class C listening outside the scheduled windows
    Continuous,
}

/// Why a received frame was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rejection {
    /// Frame could not be parsed
    Malformed,
    /// Not a downlink data frame
    WrongMessageType,
    /// Integrity check failed
    MicMismatch,
    /// Addressed to another device
    AddressMismatch,
    /// Frame counter not newer than the last accepted one
    Replay,
    /// Radio reported a CRC error
    Crc,
}

/// An accepted, decrypted downlink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    /// Port, `None` for a frame without payload
    pub port: Option<u8>,
    /// Plaintext payload
    pub payload: Vec<u8, MAX_PAYLOAD_SIZE>,
    /// MAC commands from the frame header
    pub f_opts: Vec<u8, MAX_FOPTS_SIZE>,
    /// Network asked for an acknowledgement
    pub confirmed: bool,
    /// Network acknowledged our last confirmed uplink
    pub ack: bool,
    /// Downlink frame counter
    pub fcnt: u16,
    /// Signal strength in dBm, when it came from the radio
    pub rssi: Option<i32>,
}

/// Result of validating one received frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxStatus {
    /// Frame accepted
    MessageDone(Downlink),
    /// Frame dropped
    WrongMessage(Rejection),
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A downlink was accepted
    Received {
        /// Window it arrived in
        window: Window,
        /// The downlink
        downlink: Downlink,
    },
    /// Both windows closed without a valid frame
    NoDownlink,
}

/// Timestamps of the last cycle, in timer milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// End of the uplink transmission
    pub tx_done_at: u64,
    /// When RX1 opened
    pub rx1_opened_at: Option<u64>,
    /// When RX2 opened
    pub rx2_opened_at: Option<u64>,
    /// Frames dropped during the cycle
    pub rejections: u8,
    /// Reason the most recent frame was dropped
    pub last_rejection: Option<Rejection>,
}

/// Reconfiguration requested while a cycle was running
#[derive(Debug, Default, Clone, Copy)]
struct PendingConfig {
    device_class: Option<DeviceClass>,
    uplink_channel: Option<u8>,
    uplink_data_rate: Option<u8>,
    downlink: Option<(u8, u8)>,
    tx_power: Option<i32>,
    application_port: Option<FPort>,
    channel_hopping: Option<bool>,
    confirmed_uplink: Option<bool>,
}

/// LoRaWAN MAC layer for a single end device
///
/// Owns the transceiver and the session. Every uplink starts a cycle that opens
/// RX1 and then RX2; [`poll`](MacLayer::poll) advances it without blocking and
/// [`run_cycle`](MacLayer::run_cycle) drives it to the end on the timer.
pub struct MacLayer<R: Transceiver, T: Timer> {
    radio: R,
    timer: T,
    plan: &'static RegionalPlan,
    session: Session,
    config: RadioConfiguration,
    timing: TimingParams,
    state: MacState,
    pending: PendingConfig,
    report: CycleReport,
    uplink: LinkSettings,
    window_open: bool,
    rx2_listening: bool,
    sleeping: bool,
    ack_pending: bool,
}

impl<R: Transceiver, T: Timer> MacLayer<R, T> {
    /// Create a MAC layer for a provisioned session
    pub fn new(
        radio: R,
        timer: T,
        plan: &'static RegionalPlan,
        session: Session,
        config: RadioConfiguration,
    ) -> Result<Self, MacError<R::Error>> {
        config.validate(plan)?;
        let uplink = LinkSettings {
            channel: config.uplink_channel,
            data_rate: config.uplink_data_rate,
        };
        Ok(Self {
            radio,
            timer,
            plan,
            session,
            config,
            timing: TimingParams::default(),
            state: MacState::Idle,
            pending: PendingConfig::default(),
            report: CycleReport::default(),
            uplink,
            window_open: false,
            rx2_listening: false,
            sleeping: false,
            ack_pending: false,
        })
    }

    /// Replace the receive window timing
    pub fn with_timing(mut self, timing: TimingParams) -> Self {
        self.timing = timing;
        self
    }

    /// Bring up the radio and apply the configured TX power
    pub fn initialize(&mut self) -> Result<(), MacError<R::Error>> {
        self.radio.initialize().map_err(MacError::Radio)?;
        self.radio
            .set_transmit_power(self.config.tx_power)
            .map_err(MacError::Radio)?;
        if self.config.device_class == DeviceClass::C {
            self.enter_continuous()?;
        }
        Ok(())
    }

    /// Current cycle state
    pub fn state(&self) -> MacState {
        self.state
    }

    /// Session counters and keys
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Active configuration; queued changes are not reflected until `Idle`
    pub fn config(&self) -> &RadioConfiguration {
        &self.config
    }

    /// Timestamps of the current or last cycle
    pub fn report(&self) -> &CycleReport {
        &self.report
    }

    /// The next uplink will carry the ACK bit
    pub fn ack_pending(&self) -> bool {
        self.ack_pending
    }

    /// Borrow the transceiver
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutably borrow the transceiver
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Borrow the timer
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Mutably borrow the timer
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// Swap in a freshly provisioned session
    pub fn provision(&mut self, session: Session) -> Result<(), MacError<R::Error>> {
        if self.state != MacState::Idle {
            return Err(MacError::Busy);
        }
        self.session = session;
        self.ack_pending = false;
        Ok(())
    }

    /// Send an application uplink and start the receive cycle
    pub fn send_uplink(&mut self, payload: &[u8], confirmed: bool) -> Result<(), MacError<R::Error>> {
        let ack = self.ack_pending;
        self.transmit(FrameType::Data { confirmed, ack }, payload)
    }

    /// Acknowledge a confirmed downlink with an empty frame
    pub fn send_ack(&mut self) -> Result<(), MacError<R::Error>> {
        self.transmit(FrameType::Ack, &[])
    }

    fn transmit(&mut self, frame_type: FrameType, payload: &[u8]) -> Result<(), MacError<R::Error>> {
        if self.state != MacState::Idle {
            return Err(MacError::Busy);
        }
        if payload.len() > self.plan.max_payload {
            return Err(MacError::Frame(FrameError::PayloadTooLarge));
        }

        let (port, ack) = match frame_type {
            FrameType::Data { ack, .. } => (self.config.application_port.value(), ack),
            FrameType::Ack => (FPort::MAC, true),
        };
        let fcnt = self.session.fcnt_up();
        let dev_addr = self.session.dev_addr();

        let mut plaintext: Vec<u8, MAX_PAYLOAD_SIZE> =
            Vec::from_slice(payload).map_err(|_| MacError::Frame(FrameError::PayloadTooLarge))?;
        crypto::crypt_payload_in_place(
            self.payload_key(port),
            dev_addr,
            fcnt as u32,
            Direction::Up,
            &mut plaintext,
        );

        let mut frame = encode(&self.session, &self.config, frame_type, &plaintext)?;
        let mic_start = frame.len() - MIC_SIZE;
        let mic = crypto::compute_mic(
            self.session.nwk_skey(),
            &frame[..mic_start],
            dev_addr,
            fcnt as u32,
            Direction::Up,
        );
        frame[mic_start..].copy_from_slice(&mic);

        let settings = LinkSettings {
            channel: self.config.uplink_channel,
            data_rate: self.config.uplink_data_rate,
        };
        self.state = MacState::Sending;
        self.rx2_listening = false;
        self.sleeping = false;
        if let Err(e) = self.radio.send_package(&frame, &settings) {
            self.state = MacState::Idle;
            return Err(MacError::Radio(e));
        }

        let tx_done_at = self.timer.now_ms();
        info!(
            "uplink fcnt {} sent on channel {} ({} bytes)",
            fcnt,
            settings.channel,
            frame.len()
        );
        self.session.increment_fcnt_up();
        if ack {
            self.ack_pending = false;
        }
        if self.config.channel_hopping {
            self.config.hop(self.plan.channel_count());
        }

        self.uplink = settings;
        self.report = CycleReport {
            tx_done_at,
            ..CycleReport::default()
        };
        self.window_open = false;
        self.state = MacState::AwaitingRx1;

        if self.config.device_class == DeviceClass::C {
            self.enter_continuous()?;
        }
        Ok(())
    }

    fn payload_key(&self, port: u8) -> &AESKey {
        if port == FPort::MAC {
            self.session.nwk_skey()
        } else {
            self.session.app_skey()
        }
    }

    /// Validate a raw downlink and decrypt it
    ///
    /// Checks run in order: parse, message type, MIC, address, frame counter. The
    /// first failure drops the frame and leaves the session untouched.
    pub fn receive_and_validate(&mut self, raw: &[u8]) -> RxStatus {
        let frame = match decode(raw) {
            Ok(frame) => frame,
            Err(_) => return self.reject(Rejection::Malformed),
        };
        if !frame.mtype.is_data_down() {
            return self.reject(Rejection::WrongMessageType);
        }
        let fcnt = frame.f_cnt;
        if !crypto::verify_mic(
            self.session.nwk_skey(),
            raw,
            frame.dev_addr,
            fcnt as u32,
            Direction::Down,
        ) {
            return self.reject(Rejection::MicMismatch);
        }
        if frame.dev_addr != self.session.dev_addr() {
            return self.reject(Rejection::AddressMismatch);
        }
        if !self.session.is_fresh_downlink(fcnt) {
            return self.reject(Rejection::Replay);
        }

        let mut payload = frame.payload;
        if let Some(port) = frame.f_port {
            crypto::crypt_payload_in_place(
                self.payload_key(port),
                frame.dev_addr,
                fcnt as u32,
                Direction::Down,
                &mut payload,
            );
        }

        self.session.accept_fcnt_down(fcnt);
        let confirmed = frame.mtype.is_confirmed();
        if confirmed {
            self.ack_pending = true;
        }
        info!("downlink fcnt {} accepted ({} bytes)", fcnt, payload.len());

        RxStatus::MessageDone(Downlink {
            port: frame.f_port,
            payload,
            f_opts: frame.f_opts,
            confirmed,
            ack: frame.f_ctrl.ack,
            fcnt,
            rssi: None,
        })
    }

    fn reject(&mut self, reason: Rejection) -> RxStatus {
        debug!("downlink dropped: {:?}", reason);
        self.report.rejections = self.report.rejections.saturating_add(1);
        self.report.last_rejection = Some(reason);
        RxStatus::WrongMessage(reason)
    }

    /// Advance the receive cycle
    ///
    /// Opens and closes the windows as the timer passes their deadlines and checks
    /// the radio while one is open. Returns `WouldBlock` until a downlink is
    /// accepted or RX2 closes.
    pub fn poll(&mut self) -> nb::Result<CycleOutcome, MacError<R::Error>> {
        let now = self.timer.now_ms();
        match self.state {
            MacState::Idle | MacState::Sending => Err(nb::Error::Other(MacError::NotListening)),
            MacState::AwaitingRx1 => {
                if !self.window_open {
                    if self.rx2_listening {
                        if let Some(downlink) = self.check_radio()? {
                            return self.finish(Window::Continuous, Some(downlink));
                        }
                    }
                    if now < self.rx1_opens_at() {
                        return Err(nb::Error::WouldBlock);
                    }
                    let settings = self.uplink;
                    self.open_window(&settings)?;
                    self.report.rx1_opened_at = Some(now);
                    debug!("RX1 open at {} ms", now);
                }

                if let Some(downlink) = self.check_radio()? {
                    return self.finish(Window::Rx1, Some(downlink));
                }

                if now >= self.rx1_closes_at() {
                    debug!("RX1 closed at {} ms", now);
                    self.window_open = false;
                    self.state = MacState::AwaitingRx2;
                    if self.config.device_class == DeviceClass::C {
                        self.enter_continuous()?;
                    }
                }
                Err(nb::Error::WouldBlock)
            }
            MacState::AwaitingRx2 => {
                if !self.window_open {
                    if now < self.rx2_opens_at() {
                        if self.rx2_listening {
                            if let Some(downlink) = self.check_radio()? {
                                return self.finish(Window::Continuous, Some(downlink));
                            }
                        }
                        return Err(nb::Error::WouldBlock);
                    }
                    if !self.rx2_listening {
                        let settings = self.downlink_settings();
                        self.open_window(&settings)?;
                    }
                    self.window_open = true;
                    self.report.rx2_opened_at = Some(now);
                    debug!("RX2 open at {} ms", now);
                }

                if let Some(downlink) = self.check_radio()? {
                    return self.finish(Window::Rx2, Some(downlink));
                }

                if now >= self.rx2_closes_at() {
                    debug!("RX2 closed at {} ms", now);
                    return self.finish(Window::Rx2, None);
                }
                Err(nb::Error::WouldBlock)
            }
        }
    }

    /// Block on the timer until the current cycle ends
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, MacError<R::Error>> {
        loop {
            match self.poll() {
                Ok(outcome) => return Ok(outcome),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {
                    let wait = self.next_wait();
                    self.timer.delay_ms(wait);
                }
            }
        }
    }

    /// Send an uplink with the configured confirm flag and wait out its receive windows
    pub fn send_and_receive(&mut self, payload: &[u8]) -> Result<CycleOutcome, MacError<R::Error>> {
        self.send_uplink(payload, self.config.confirmed_uplink)?;
        self.run_cycle()
    }

    /// Check for a Class C downlink between cycles
    pub fn poll_continuous(&mut self) -> nb::Result<Downlink, MacError<R::Error>> {
        if self.state != MacState::Idle {
            return Err(nb::Error::Other(MacError::Busy));
        }
        if self.config.device_class != DeviceClass::C || self.sleeping {
            return Err(nb::Error::Other(MacError::NotListening));
        }
        if !self.rx2_listening {
            self.enter_continuous()?;
        }
        match self.check_radio()? {
            Some(downlink) => Ok(downlink),
            None => Err(nb::Error::WouldBlock),
        }
    }

    /// Put the radio to sleep between cycles
    pub fn sleep(&mut self) -> Result<(), MacError<R::Error>> {
        if self.state != MacState::Idle {
            return Err(MacError::Busy);
        }
        self.radio.switch_mode(Mode::Sleep).map_err(MacError::Radio)?;
        self.rx2_listening = false;
        self.sleeping = true;
        Ok(())
    }

    /// Wake the radio; Class C resumes listening
    pub fn wake_up(&mut self) -> Result<(), MacError<R::Error>> {
        if self.state != MacState::Idle {
            return Err(MacError::Busy);
        }
        self.sleeping = false;
        self.radio.switch_mode(Mode::Standby).map_err(MacError::Radio)?;
        if self.config.device_class == DeviceClass::C {
            self.enter_continuous()?;
        }
        Ok(())
    }

    /// Switch between Class A and Class C
    pub fn set_device_class(&mut self, class: DeviceClass) -> Result<(), MacError<R::Error>> {
        self.pending.device_class = Some(class);
        self.apply_if_idle()
    }

    /// Pin the uplink to a channel
    pub fn set_uplink_channel(&mut self, channel: u8) -> Result<(), MacError<R::Error>> {
        if channel as usize >= self.plan.channel_count() {
            return Err(MacError::Config(ConfigError::InvalidChannel(channel)));
        }
        self.pending.uplink_channel = Some(channel);
        self.apply_if_idle()
    }

    /// Change the uplink data rate
    pub fn set_uplink_data_rate(&mut self, data_rate: u8) -> Result<(), MacError<R::Error>> {
        if self.plan.data_rate(data_rate).is_none() {
            return Err(MacError::Config(ConfigError::InvalidDataRate(data_rate)));
        }
        self.pending.uplink_data_rate = Some(data_rate);
        self.apply_if_idle()
    }

    /// Change the RX2 channel and data rate
    pub fn set_downlink(&mut self, channel: u8, data_rate: u8) -> Result<(), MacError<R::Error>> {
        if self.plan.frequency(channel).is_none() {
            return Err(MacError::Config(ConfigError::InvalidChannel(channel)));
        }
        if self.plan.data_rate(data_rate).is_none() {
            return Err(MacError::Config(ConfigError::InvalidDataRate(data_rate)));
        }
        self.pending.downlink = Some((channel, data_rate));
        self.apply_if_idle()
    }

    /// Change the TX power (dBm, clamped to 0-20)
    pub fn set_transmit_power(&mut self, level: i32) -> Result<(), MacError<R::Error>> {
        self.pending.tx_power = Some(level.clamp(0, 20));
        self.apply_if_idle()
    }

    /// Change the port application uplinks are sent on
    pub fn set_application_port(&mut self, port: FPort) -> Result<(), MacError<R::Error>> {
        self.pending.application_port = Some(port);
        self.apply_if_idle()
    }

    /// Turn uplink channel hopping on or off
    pub fn set_channel_hopping(&mut self, enabled: bool) -> Result<(), MacError<R::Error>> {
        self.pending.channel_hopping = Some(enabled);
        self.apply_if_idle()
    }

    /// Confirm flag used by [`send_and_receive`](MacLayer::send_and_receive)
    pub fn set_confirmed_uplink(&mut self, confirmed: bool) -> Result<(), MacError<R::Error>> {
        self.pending.confirmed_uplink = Some(confirmed);
        self.apply_if_idle()
    }

    fn apply_if_idle(&mut self) -> Result<(), MacError<R::Error>> {
        if self.state == MacState::Idle {
            self.apply_pending()?;
        }
        Ok(())
    }

    fn apply_pending(&mut self) -> Result<(), MacError<R::Error>> {
        let pending = core::mem::take(&mut self.pending);
        let mut relisten = false;

        if let Some(class) = pending.device_class {
            if class != self.config.device_class {
                debug!("device class {:?} -> {:?}", self.config.device_class, class);
                self.config.device_class = class;
                relisten = true;
            }
        }
        if let Some(channel) = pending.uplink_channel {
            self.config.uplink_channel = channel;
        }
        if let Some(data_rate) = pending.uplink_data_rate {
            self.config.uplink_data_rate = data_rate;
        }
        if let Some(port) = pending.application_port {
            self.config.application_port = port;
        }
        if let Some(enabled) = pending.channel_hopping {
            self.config.channel_hopping = enabled;
        }
        if let Some(confirmed) = pending.confirmed_uplink {
            self.config.confirmed_uplink = confirmed;
        }
        if let Some((channel, data_rate)) = pending.downlink {
            self.config.downlink_channel = channel;
            self.config.downlink_data_rate = data_rate;
            relisten = true;
        }

        if relisten && !self.sleeping {
            match self.config.device_class {
                DeviceClass::C => self.enter_continuous()?,
                DeviceClass::A if self.rx2_listening => {
                    self.radio.switch_mode(Mode::Standby).map_err(MacError::Radio)?;
                    self.rx2_listening = false;
                }
                DeviceClass::A => {}
            }
        }
        if let Some(level) = pending.tx_power {
            if let Err(e) = self.radio.set_transmit_power(level) {
                // Retried on the next return to idle
                self.pending.tx_power.get_or_insert(level);
                return Err(MacError::Radio(e));
            }
            self.config.tx_power = level;
        }
        Ok(())
    }

    fn finish(
        &mut self,
        window: Window,
        downlink: Option<Downlink>,
    ) -> nb::Result<CycleOutcome, MacError<R::Error>> {
        self.state = MacState::Idle;
        self.window_open = false;

        // Accepted downlinks are already counted; return them whether or not
        // the radio settles
        match (downlink, self.settle()) {
            (Some(downlink), result) => {
                if let Err(e) = result {
                    warn!("radio not settled after {:?} downlink: {:?}", window, e);
                }
                Ok(CycleOutcome::Received { window, downlink })
            }
            (None, Ok(())) => Ok(CycleOutcome::NoDownlink),
            (None, Err(e)) => Err(nb::Error::Other(e)),
        }
    }

    fn settle(&mut self) -> Result<(), MacError<R::Error>> {
        self.apply_pending()?;
        match self.config.device_class {
            DeviceClass::C if !self.rx2_listening => self.enter_continuous(),
            DeviceClass::C => Ok(()),
            DeviceClass::A => self.radio.switch_mode(Mode::Standby).map_err(MacError::Radio),
        }
    }

    fn check_radio(&mut self) -> Result<Option<Downlink>, MacError<R::Error>> {
        let package = self.radio.receive_package().map_err(MacError::Radio)?;
        match package.status {
            PackageStatus::NoMessage => Ok(None),
            PackageStatus::Malformed => {
                self.reject(Rejection::Crc);
                Ok(None)
            }
            PackageStatus::CrcOk => {
                let rssi = self.radio.get_rssi().map_err(MacError::Radio)?;
                match self.receive_and_validate(&package.data) {
                    RxStatus::MessageDone(mut downlink) => {
                        downlink.rssi = Some(rssi);
                        Ok(Some(downlink))
                    }
                    RxStatus::WrongMessage(_) => Ok(None),
                }
            }
        }
    }

    fn open_window(&mut self, settings: &LinkSettings) -> Result<(), MacError<R::Error>> {
        self.radio
            .start_receive(settings, RxMode::Continuous)
            .map_err(MacError::Radio)?;
        self.window_open = true;
        self.rx2_listening = false;
        Ok(())
    }

    fn enter_continuous(&mut self) -> Result<(), MacError<R::Error>> {
        let settings = self.downlink_settings();
        self.radio
            .start_receive(&settings, RxMode::Continuous)
            .map_err(MacError::Radio)?;
        self.rx2_listening = true;
        Ok(())
    }

    fn downlink_settings(&self) -> LinkSettings {
        LinkSettings {
            channel: self.config.downlink_channel,
            data_rate: self.config.downlink_data_rate,
        }
    }

    fn rx1_opens_at(&self) -> u64 {
        self.report.tx_done_at + self.timing.rx1_delay_ms as u64
    }

    fn rx1_closes_at(&self) -> u64 {
        self.rx1_opens_at() + self.timing.rx_window_ms as u64
    }

    fn rx2_opens_at(&self) -> u64 {
        self.report.tx_done_at + self.timing.rx2_delay_ms as u64
    }

    fn rx2_closes_at(&self) -> u64 {
        self.rx2_opens_at() + self.timing.rx_window_ms as u64
    }

    fn next_wait(&self) -> u32 {
        let now = self.timer.now_ms();
        let (deadline, listening) = match (self.state, self.window_open) {
            (MacState::AwaitingRx1, false) => (self.rx1_opens_at(), self.rx2_listening),
            (MacState::AwaitingRx1, true) => (self.rx1_closes_at(), true),
            (MacState::AwaitingRx2, false) => (self.rx2_opens_at(), self.rx2_listening),
            (MacState::AwaitingRx2, true) => (self.rx2_closes_at(), true),
            _ => (now, false),
        };
        let until = deadline.saturating_sub(now).min(u32::MAX as u64) as u32;
        if listening {
            until.min(self.timing.poll_interval_ms.max(1))
        } else {
            until
        }
    }
}
